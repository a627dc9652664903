use nom::branch::alt;
use nom::bytes::complete::escaped;
use nom::bytes::complete::tag;
use nom::bytes::complete::take_while1;
use nom::character::complete::multispace0;
use nom::character::complete::none_of;
use nom::combinator::all_consuming;
use nom::multi::separated_list0;
use nom::sequence::delimited;
use nom::sequence::separated_pair;
use nom::IResult;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;
use std::str::FromStr;

use crate::Error;

/// Device filter and driver options, written as `key=value` pairs.
///
/// ```
/// use rsp_tools::Args;
///
/// let args: Args = "driver=dummy, serial='dummy-0'".parse().unwrap();
/// assert_eq!(args.get::<String>("serial").unwrap(), "dummy-0");
/// ```
#[derive(Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Args {
    map: HashMap<String, String>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }
    /// Parse the value stored under `key`.
    pub fn get<V: FromStr<Err = impl std::error::Error>>(
        &self,
        key: impl AsRef<str>,
    ) -> Result<V, Error> {
        self.map
            .get(key.as_ref())
            .ok_or(Error::NotFound)
            .and_then(|v| v.parse().or(Err(Error::ValueError)))
    }
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> Option<String> {
        self.map.insert(key.into(), value.into())
    }
    pub fn remove(&mut self, key: impl AsRef<str>) -> Option<String> {
        self.map.remove(key.as_ref())
    }
    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, String, String> {
        self.map.iter()
    }
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
    /// Deserialize the options into a typed driver configuration.
    ///
    /// Values are strings, so numeric fields need `DisplayFromStr`.
    pub fn deserialize<D: for<'a> Deserialize<'a>>(&self) -> Result<D, Error> {
        let value = serde_json::to_value(self).or(Err(Error::ValueError))?;
        serde_json::from_value(value).map_err(|e| {
            log::warn!("invalid device options {self}: {e}");
            Error::ValueError
        })
    }
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.map.fmt(f)
    }
}

impl std::fmt::Display for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.map.keys().collect();
        keys.sort();
        for (i, k) in keys.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", k, self.map[k])?;
        }
        Ok(())
    }
}

fn token(input: &str) -> IResult<&str, &str> {
    let single = escaped(none_of("\\\'"), '\\', tag("'"));
    let double = escaped(none_of("\\\""), '\\', tag("\""));
    let bare = |c: char| c != ',' && c != '=' && !c.is_whitespace();

    delimited(
        multispace0,
        alt((
            delimited(tag("'"), alt((single, tag(""))), tag("'")),
            delimited(tag("\""), alt((double, tag(""))), tag("\"")),
            take_while1(bare),
        )),
        multispace0,
    )(input)
}

fn pairs(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    all_consuming(delimited(
        multispace0,
        separated_list0(tag(","), separated_pair(token, tag("="), token)),
        multispace0,
    ))(input)
}

impl FromStr for Args {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, pairs) = pairs(s).or(Err(Error::ValueError))?;
        Ok(Args {
            map: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

impl TryFrom<&str> for Args {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Args {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<&String> for Args {
    type Error = Error;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<&Args> for Args {
    fn from(value: &Args) -> Self {
        value.clone()
    }
}
