use cadence_core::{Event, Service, SubMaster, new_message};
use std::time::Duration;

/// Tick timeout used by transport-level tests.
#[allow(dead_code)]
pub const TICK: Duration = Duration::from_millis(100);

/// A fresh envelope for `service`, with empty lists for list payloads.
pub fn message(service: Service, valid: bool) -> Event {
    let size = service.is_list().then_some(0);
    new_message(service, size)
        .unwrap()
        .with_valid(valid)
}

/// Feed `service` once per tick at the given receive times.
#[allow(dead_code)]
pub fn feed_at(sm: &mut SubMaster, service: Service, times: impl IntoIterator<Item = Duration>) {
    for now in times {
        sm.update_msgs(now, [Some(message(service, true))]);
    }
}

/// Evenly spaced receive times.
#[allow(dead_code)]
pub fn periodic(start: Duration, period: Duration, count: u32) -> Vec<Duration> {
    (0..count).map(|i| start + period * i).collect()
}

/// Run ticks until `pred` holds, giving up after `max_ticks`.
#[allow(dead_code)]
pub fn update_until<F>(sm: &mut SubMaster, max_ticks: usize, mut pred: F) -> bool
where
    F: FnMut(&SubMaster) -> bool,
{
    for _ in 0..max_ticks {
        sm.update(TICK).unwrap();
        if pred(sm) {
            return true;
        }
    }
    false
}
