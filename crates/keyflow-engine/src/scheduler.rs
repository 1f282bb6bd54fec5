//! Schedule table: next-fire bookkeeping for every scheduled flow.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime, TimeDelta};
use keyflow_config::ScheduleSpec;
use keyflow_protocol::{FlowId, Trigger};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::schedule::{Schedule, ScheduleParseError};

/// Source of wall-clock time for the scheduler.
pub trait Clock: Send + Sync {
    /// Current local time.
    fn now(&self) -> NaiveDateTime;
}

/// The system clock in local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    /// Current time.
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    /// A clock frozen at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

/// One armed schedule.
#[derive(Debug)]
struct Entry {
    /// Parsed schedule.
    schedule: Schedule,
    /// Definition it came from.
    spec: ScheduleSpec,
    /// Next fire time.
    next_fire: NaiveDateTime,
}

/// Per-flow next-fire table.
#[derive(Debug, Default)]
pub struct Scheduler {
    /// Armed schedules by flow.
    entries: BTreeMap<FlowId, Entry>,
}

impl Scheduler {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) `flow_id` with `spec`, returning the first fire time
    /// after `now`. On error any previous entry for the flow is removed.
    pub fn arm(
        &mut self,
        flow_id: &FlowId,
        spec: &ScheduleSpec,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime, ScheduleParseError> {
        let armed = Schedule::parse(spec.kind, &spec.expression).and_then(|schedule| {
            let next = schedule.next_after(now).ok_or_else(|| ScheduleParseError {
                kind: spec.kind,
                expression: spec.expression.clone(),
                message: "schedule never fires".into(),
            })?;
            Ok((schedule, next))
        });
        match armed {
            Ok((schedule, next_fire)) => {
                debug!(flow = %flow_id, kind = %spec.kind, expr = %spec.expression, %next_fire, "schedule_armed");
                self.entries.insert(
                    flow_id.clone(),
                    Entry {
                        schedule,
                        spec: spec.clone(),
                        next_fire,
                    },
                );
                Ok(next_fire)
            }
            Err(e) => {
                self.entries.remove(flow_id);
                Err(e)
            }
        }
    }

    /// Remove a flow's schedule. Returns whether one was armed.
    pub fn disarm(&mut self, flow_id: &FlowId) -> bool {
        self.entries.remove(flow_id).is_some()
    }

    /// Remove every schedule.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Collect every flow whose fire time is at or before `now`, then move
    /// each one to its next fire time strictly after `now`. A fire time that
    /// passed while the process was not ticking fires at most once here and
    /// is never replayed.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<(FlowId, Trigger)> {
        let mut due = Vec::new();
        let mut exhausted = Vec::new();
        for (flow_id, entry) in &mut self.entries {
            if entry.next_fire > now {
                continue;
            }
            trace!(flow = %flow_id, due = %entry.next_fire, %now, "schedule_due");
            due.push((
                flow_id.clone(),
                Trigger::Schedule {
                    kind: entry.spec.kind,
                    spec: entry.spec.expression.clone(),
                },
            ));
            match entry.schedule.next_after(now) {
                Some(next) => entry.next_fire = next,
                None => exhausted.push(flow_id.clone()),
            }
        }
        for flow_id in exhausted {
            self.entries.remove(&flow_id);
        }
        due
    }

    /// Next fire time for `flow_id`, if armed.
    pub fn next_fire(&self, flow_id: &FlowId) -> Option<NaiveDateTime> {
        self.entries.get(flow_id).map(|e| e.next_fire)
    }

    /// All armed flows ordered by next fire time.
    pub fn upcoming(&self) -> Vec<(FlowId, NaiveDateTime)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|(id, e)| (id.clone(), e.next_fire))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Number of armed schedules.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is armed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
