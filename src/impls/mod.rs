#[cfg(feature = "dummy")]
pub mod dummy;
#[cfg(feature = "dummy")]
pub use dummy::Dummy;

#[cfg(all(test, feature = "dummy"))]
pub(crate) mod mock;
