//! Search requests: result count, beam width, filter and cancellation.

use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Allow-list predicate over external ids.
///
/// Evaluated on every traversed candidate, so it should be cheap.
pub trait Predicate: Send + Sync {
    /// True if the object may appear in results.
    fn matches(&self, external_id: &Uuid) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Uuid) -> bool + Send + Sync,
{
    fn matches(&self, external_id: &Uuid) -> bool {
        self(external_id)
    }
}

/// A fixed set of permitted external ids.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    ids: FxHashSet<Uuid>,
}

impl AllowList {
    /// Creates an empty list (matches nothing).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Permits one more id.
    pub fn insert(&mut self, id: Uuid) -> bool {
        self.ids.insert(id)
    }

    /// Number of permitted ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if nothing is permitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<Uuid> for AllowList {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Predicate for AllowList {
    fn matches(&self, external_id: &Uuid) -> bool {
        self.ids.contains(external_id)
    }
}

/// Shared cancellation flag.
///
/// Clones observe the same flag; cancel from any thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once [`CancellationToken::cancel`] was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a cancelled search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Best results found so far (possibly empty).
    #[default]
    ReturnPartial,
    /// [`crate::Error::Cancelled`].
    Fail,
}

/// Parameters of one search.
///
/// ```
/// use std::time::Duration;
/// use tessera_core::{CancelPolicy, SearchRequest};
///
/// let request = SearchRequest::new(10)
///     .with_ef(128)
///     .with_timeout(Duration::from_millis(50))
///     .on_cancel(CancelPolicy::Fail);
/// assert_eq!(request.k(), 10);
/// ```
#[derive(Clone)]
pub struct SearchRequest {
    k: usize,
    ef: Option<usize>,
    filter: Option<Arc<dyn Predicate>>,
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
    on_cancel: CancelPolicy,
}

impl SearchRequest {
    /// Asks for the `k` nearest neighbors with default settings.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ef: None,
            filter: None,
            deadline: None,
            cancel: None,
            on_cancel: CancelPolicy::default(),
        }
    }

    /// Sets the beam width (raised to at least `k`).
    #[must_use]
    pub fn with_ef(mut self, ef: usize) -> Self {
        self.ef = Some(ef);
        self
    }

    /// Restricts results to objects accepted by `filter`.
    #[must_use]
    pub fn with_filter<P: Predicate + 'static>(mut self, filter: P) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Stops the search at `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Stops the search `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Stops the search when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Chooses what an interrupted search returns.
    #[must_use]
    pub fn on_cancel(mut self, policy: CancelPolicy) -> Self {
        self.on_cancel = policy;
        self
    }

    /// Requested result count.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }

    /// Requested beam width, if set.
    #[must_use]
    pub fn ef(&self) -> Option<usize> {
        self.ef
    }

    /// Filter, if set.
    #[must_use]
    pub fn filter(&self) -> Option<&dyn Predicate> {
        self.filter.as_deref()
    }

    /// Deadline, if set.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancellation token, if set.
    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Cancellation policy.
    #[must_use]
    pub fn cancel_policy(&self) -> CancelPolicy {
        self.on_cancel
    }
}

impl fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRequest")
            .field("k", &self.k)
            .field("ef", &self.ef)
            .field("filtered", &self.filter.is_some())
            .field("deadline", &self.deadline)
            .field("cancellable", &self.cancel.is_some())
            .field("on_cancel", &self.on_cancel)
            .finish()
    }
}
