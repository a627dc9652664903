use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crate::Confirmation;
use crate::DeviceTrait;
use crate::Error;
use crate::Event;
use crate::GainSchedule;
use crate::NotificationFlag;
use crate::Progress;
use crate::SequenceTracker;
use crate::Session;
use crate::StreamHandler;
use crate::StreamParams;
use crate::TunerSelect;
use crate::UpdateConfirmer;

/// State shared between the gain change loop and the delivery thread.
#[derive(Debug, Default)]
pub struct GainChangeContext {
    flag: NotificationFlag,
    sequence: SequenceTracker,
}

impl GainChangeContext {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn flag(&self) -> &NotificationFlag {
        &self.flag
    }
    pub fn sequence(&self) -> &SequenceTracker {
        &self.sequence
    }
}

impl StreamHandler for GainChangeContext {
    fn samples(&self, _xi: &[i16], _xq: &[i16], params: &StreamParams, reset: bool) {
        if params.gr_changed {
            log::debug!("> grChanged at sample {}", params.first_sample_num);
        }
        self.flag.notify(params.gr_changed);
        if reset {
            log::warn!("stream reset at sample {}", params.first_sample_num);
        }
        self.sequence
            .track(params.first_sample_num, params.num_samples);
    }

    fn event(&self, event: Event, tuner: TunerSelect) {
        log::trace!("event {event:?} on tuner {tuner}");
    }
}

/// Counts of a finished gain change loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub changes: u32,
    pub confirmed: u32,
    pub timed_out: u32,
}

/// The gain change loop.
#[derive(Debug, Clone)]
pub struct GainCycle {
    pub schedule: GainSchedule,
    /// Number of gain changes.
    pub count: u32,
    /// Delay before each change.
    pub wait: Duration,
    pub progress: Progress,
}

impl GainCycle {
    pub fn new(schedule: GainSchedule) -> Self {
        Self {
            schedule,
            count: u32::MAX,
            wait: Duration::ZERO,
            progress: Progress::default(),
        }
    }

    /// Run changes 1 to `count` on a streaming `session` whose handler is `context`.
    ///
    /// Each change is confirmed or timed out before the next one is written. A timeout is
    /// logged and the loop goes on; a device error ends it. Setting `stop` ends the loop
    /// after the change in progress.
    pub fn run<D: DeviceTrait>(
        &self,
        session: &mut Session<D>,
        context: &GainChangeContext,
        confirmer: &mut UpdateConfirmer,
        stop: &AtomicBool,
    ) -> Result<CycleReport, Error> {
        let mut report = CycleReport::default();
        log::info!("changing gains - wait time={}us", self.wait.as_micros());
        for n in 1..=self.count {
            if stop.load(Ordering::Relaxed) {
                log::info!("stopped after {} gain changes", report.changes);
                break;
            }
            if !self.wait.is_zero() {
                thread::sleep(self.wait);
            }
            session.set_gain(self.schedule.at(n))?;
            let outcome = confirmer
                .apply(context.flag(), || session.request_tuner_gain_update())
                .map_err(|e| {
                    log::error!("gain change #{n} failed");
                    e
                })?;
            report.changes += 1;
            self.progress.change(n);
            log::debug!("> ngc={n} elapsed={}", outcome.polls());
            match outcome {
                Confirmation::Confirmed { .. } => report.confirmed += 1,
                Confirmation::TimedOut { .. } => {
                    log::warn!("gain change update timeout (#{n})");
                    report.timed_out += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::impls::mock::Call;
    use crate::impls::mock::Mock;
    use crate::DeviceParams;
    use crate::GainSetting;
    use std::sync::Arc;
    use std::sync::Mutex;

    fn streaming(dev: Arc<Mock>, context: Arc<GainChangeContext>) -> Session<Arc<Mock>> {
        let mut session = Session::open(dev, None, false).unwrap();
        session
            .apply_initial_configuration(&DeviceParams::default())
            .unwrap();
        session.start_streaming(context).unwrap();
        session
    }

    #[test]
    fn cooperative_device_confirms_every_change() {
        let context = Arc::new(GainChangeContext::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dev = Arc::new(Mock::new().on_update({
            let context = context.clone();
            let seen = seen.clone();
            move || {
                let flag = context.flag();
                seen.lock().unwrap().push((flag.resets(), flag.is_set()));
            }
        }));
        let mut session = streaming(dev.clone(), context.clone());

        let mut cycle = GainCycle::new(GainSchedule::new(vec![40, 20, 60], vec![0, 1]).unwrap());
        cycle.count = 25;
        let mut confirmer = UpdateConfirmer::new(100, Duration::from_micros(1));
        let report = cycle
            .run(&mut session, &context, &mut confirmer, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(
            report,
            CycleReport {
                changes: 25,
                confirmed: 25,
                timed_out: 0
            }
        );

        // one reset right before every update, never two updates in a row
        let expected: Vec<_> = (1..=25u64).map(|n| (n, false)).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
        let calls = dev.calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Update(_))).count(), 25);
        assert_eq!(
            dev.gains(),
            (1..=25)
                .map(|n| cycle.schedule.at(n))
                .collect::<Vec<GainSetting>>()
        );
        session.shutdown().unwrap();
    }
    #[test]
    fn silent_device_times_out_and_continues() {
        let context = Arc::new(GainChangeContext::new());
        let dev = Arc::new(Mock::new().silent());
        let mut session = streaming(dev.clone(), context.clone());

        let mut cycle = GainCycle::new(GainSchedule::new(vec![30, 50], vec![2]).unwrap());
        cycle.count = 3;
        let mut confirmer = UpdateConfirmer::new(20, Duration::from_micros(1));
        let report = cycle
            .run(&mut session, &context, &mut confirmer, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(report.changes, 3);
        assert_eq!(report.timed_out, 3);
        assert_eq!(context.flag().resets(), 3);
        assert_eq!(dev.gains().len(), 3);
    }
    #[test]
    fn update_failure_ends_loop() {
        let context = Arc::new(GainChangeContext::new());
        let dev = Arc::new(Mock::new().failing_update_after(2));
        let mut session = streaming(dev.clone(), context.clone());

        let mut cycle = GainCycle::new(GainSchedule::new(vec![30], vec![0]).unwrap());
        cycle.count = 10;
        let mut confirmer = UpdateConfirmer::new(20, Duration::from_micros(1));
        let r = cycle.run(&mut session, &context, &mut confirmer, &AtomicBool::new(false));
        assert!(matches!(r, Err(Error::Api { call: "Update", .. })));
        assert_eq!(dev.gains().len(), 2);
    }
    #[test]
    fn stop_flag_ends_loop_early() {
        let context = Arc::new(GainChangeContext::new());
        let dev = Arc::new(Mock::new());
        let mut session = streaming(dev.clone(), context.clone());

        let cycle = GainCycle::new(GainSchedule::new(vec![30], vec![0]).unwrap());
        let mut confirmer = UpdateConfirmer::default();
        let report = cycle
            .run(&mut session, &context, &mut confirmer, &AtomicBool::new(true))
            .unwrap();
        assert_eq!(report, CycleReport::default());
        assert!(dev.gains().is_empty());
    }
    #[test]
    fn handler_tracks_stream() {
        let context = GainChangeContext::new();
        let params = StreamParams {
            first_sample_num: 0,
            num_samples: 1000,
            gr_changed: true,
            ..Default::default()
        };
        context.samples(&[0; 1000], &[0; 1000], &params, false);
        assert!(context.flag().is_set());
        assert_eq!(context.sequence().next_expected(), Some(1000));
    }
}
