//! Label assignment: pairs sorted prediction times with sorted outcome times.

use chrono::{Duration, NaiveDateTime};
use timeline_core::{CensoringPolicy, Label, LabelValue, MatchPolicy, TimeHorizon};

/// Result of checking one window against the outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    Positive,
    Negative,
    /// The window closes after the observation boundary with no outcome seen.
    Censored,
}

impl WindowOutcome {
    /// Boolean label for this outcome under `censoring`, or `None` when dropped.
    pub fn to_label(self, time: NaiveDateTime, censoring: CensoringPolicy) -> Option<Label> {
        match (self, censoring) {
            (WindowOutcome::Positive, _) => Some(Label::boolean(time, true)),
            (WindowOutcome::Negative, _) => Some(Label::boolean(time, false)),
            (WindowOutcome::Censored, CensoringPolicy::Discard) => None,
            (WindowOutcome::Censored, CensoringPolicy::Negative) => {
                Some(Label::boolean(time, false))
            }
            (WindowOutcome::Censored, CensoringPolicy::Unknown) => {
                Some(Label::new(time, LabelValue::Unknown))
            }
        }
    }
}

/// Forward-only cursor over ascending outcome times.
///
/// Queries must come with non-decreasing lower bounds; the cursor never moves
/// back, which keeps a full sweep linear in the number of times.
#[derive(Debug)]
pub struct OutcomeCursor<'a> {
    outcomes: &'a [NaiveDateTime],
    position: usize,
}

impl<'a> OutcomeCursor<'a> {
    pub fn new(outcomes: &'a [NaiveDateTime]) -> Self {
        Self {
            outcomes,
            position: 0,
        }
    }

    /// Decide the window `[lo, hi]` (`hi = None` is unbounded) for a
    /// prediction made at `prediction_time`.
    ///
    /// `skip_same_time` ignores an outcome at exactly `prediction_time`. It is
    /// only meaningful when the window opens at the prediction time.
    pub fn decide(
        &mut self,
        prediction_time: NaiveDateTime,
        lo: Option<NaiveDateTime>,
        hi: Option<NaiveDateTime>,
        boundary: NaiveDateTime,
        skip_same_time: bool,
    ) -> WindowOutcome {
        // `lo == None` only when the offset overflowed past any representable time.
        while self.position < self.outcomes.len()
            && lo.map_or(true, |lo| self.outcomes[self.position] < lo)
        {
            self.position += 1;
        }

        let mut candidate = self.position;
        if skip_same_time
            && candidate < self.outcomes.len()
            && self.outcomes[candidate] == prediction_time
        {
            candidate += 1;
        }

        let hit = self
            .outcomes
            .get(candidate)
            .is_some_and(|outcome| hi.map_or(true, |hi| *outcome <= hi));

        match hi {
            _ if hit => WindowOutcome::Positive,
            // Open-ended windows are decided by what was observed.
            None => WindowOutcome::Negative,
            Some(hi) if hi <= boundary => WindowOutcome::Negative,
            Some(_) => WindowOutcome::Censored,
        }
    }
}

/// Sort and drop repeated instants.
pub fn normalize_times(mut times: Vec<NaiveDateTime>) -> Vec<NaiveDateTime> {
    times.sort_unstable();
    times.dedup();
    times
}

fn checked_shift(time: NaiveDateTime, offset: Duration) -> Option<NaiveDateTime> {
    time.checked_add_signed(offset)
}

/// Assign one boolean label per prediction time.
///
/// Both inputs are normalized first, so callers may pass raw extraction
/// results. Output times are strictly ascending.
pub fn assign_labels(
    prediction_times: Vec<NaiveDateTime>,
    outcome_times: Vec<NaiveDateTime>,
    horizon: &TimeHorizon,
    boundary: NaiveDateTime,
    policy: &MatchPolicy,
) -> Vec<Label> {
    let predictions = normalize_times(prediction_times);
    let outcomes = normalize_times(outcome_times);
    let mut cursor = OutcomeCursor::new(&outcomes);
    let skip_same_time = !policy.allow_same_time && horizon.start() == Duration::zero();

    let mut labels = Vec::with_capacity(predictions.len());
    for time in predictions {
        let lo = checked_shift(time, horizon.start());
        // An end that overflows behaves like an open window.
        let hi = horizon.end().and_then(|end| checked_shift(time, end));
        let decision = cursor.decide(time, lo, hi, boundary, skip_same_time);
        if decision == WindowOutcome::Censored {
            log::trace!("Prediction at {time} censored by boundary {boundary}");
        }
        if let Some(label) = decision.to_label(time, policy.censoring) {
            labels.push(label);
        }
    }
    labels
}
