//! Lazy, effectful, multi-result streams.
//!
//! A [`Stream`] is a recipe, not a container: every call to
//! [`Stream::drive`] (or [`Stream::run`] with a [`Fold`]) produces its values
//! from scratch, performing each side effect at the moment the next value is
//! pulled. Production is push-driven: the stream calls a sink once per value
//! and the sink answers [`Flow::Continue`] or [`Flow::Break`].
//!
//! Resources a stream opens while producing ([`Stream::using`],
//! [`Stream::unfold_scoped`]) live on the stack of the drive call, so they are
//! released when that call returns, whether the source ran dry, the sink
//! broke off, or an error propagated. [`Stream::run`] only calls the fold's
//! `finish` after the drive has returned, so every release precedes it.

pub mod fold;

pub use fold::Fold;

use std::fmt;
use std::io::BufRead;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::error::Result;
use crate::scope::ScopedResource;

/// Whether the consumer wants another value.
pub type Flow = ControlFlow<()>;

/// Per-value callback a stream pushes into.
pub type Sink<'a, T> = dyn FnMut(T) -> Result<Flow> + 'a;

type Producer<T> = dyn Fn(&mut Sink<'_, T>) -> Result<Flow> + Send + Sync;

/// An effectful, possibly infinite, ordered sequence of `T`.
pub struct Stream<T> {
    producer: Arc<Producer<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Stream { .. }")
    }
}

impl<T: 'static> Stream<T> {
    /// Build a stream from a raw producer.
    ///
    /// The producer must call the sink once per value, stop as soon as the
    /// sink returns `Break` and return that `Break`, and return `Continue`
    /// after its last value.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(&mut Sink<'_, T>) -> Result<Flow> + Send + Sync + 'static,
    {
        Self {
            producer: Arc::new(producer),
        }
    }

    /// Push every value into `sink`. Returns `Break` if the sink stopped
    /// early, `Continue` if the stream ran dry.
    pub fn drive(&self, sink: &mut Sink<'_, T>) -> Result<Flow> {
        (self.producer)(sink)
    }

    /// Run the stream against `fold`, calling `finish` exactly once after
    /// the stream is exhausted or the fold stops pulling.
    pub fn run<F: Fold<T>>(&self, mut fold: F) -> Result<F::Output> {
        self.drive(&mut |item| Ok(fold.step(item)))?;
        Ok(fold.finish())
    }

    /// [`Stream::run`] with a fold assembled from `init`, `step`, `finish`.
    pub fn fold<S, R>(
        &self,
        init: S,
        step: impl FnMut(S, T) -> ControlFlow<S, S>,
        finish: impl FnOnce(S) -> R,
    ) -> Result<R> {
        self.run(fold::FoldFn::new(init, step, finish))
    }

    /// Produces nothing.
    pub fn empty() -> Self {
        Self::new(|_| Ok(Flow::Continue(())))
    }

    /// Yields `value` once.
    pub fn once(value: T) -> Self
    where
        T: Clone + Send + Sync,
    {
        Self::new(move |sink| sink(value.clone()))
    }

    /// Runs `effect` when pulled and yields its result once.
    pub fn from_effect<F>(effect: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::new(move |sink| sink(effect()?))
    }

    /// Yields the result of `effect` forever, running it once per pull.
    pub fn repeat_with<F>(effect: F) -> Self
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
    {
        Self::new(move |sink| loop {
            if sink(effect()?)?.is_break() {
                return Ok(Flow::Break(()));
            }
        })
    }

    /// Stateful source: `init` builds fresh state for each drive, `next`
    /// produces values until it returns `None`.
    pub fn generate<S, I, N>(init: I, next: N) -> Self
    where
        I: Fn() -> Result<S> + Send + Sync + 'static,
        N: Fn(&mut S) -> Result<Option<T>> + Send + Sync + 'static,
    {
        Self::new(move |sink| {
            let mut state = init()?;
            while let Some(item) = next(&mut state)? {
                if sink(item)?.is_break() {
                    return Ok(Flow::Break(()));
                }
            }
            Ok(Flow::Continue(()))
        })
    }

    /// Like [`Stream::generate`], but the state is a scoped resource that is
    /// released as soon as the drive ends, however it ends.
    pub fn unfold_scoped<V, A, N>(acquire: A, next: N) -> Self
    where
        A: Fn() -> Result<ScopedResource<V>> + Send + Sync + 'static,
        N: Fn(&mut V) -> Result<Option<T>> + Send + Sync + 'static,
    {
        Self::new(move |sink| {
            let mut resource = acquire()?;
            while let Some(item) = next(&mut *resource)? {
                if sink(item)?.is_break() {
                    return Ok(Flow::Break(()));
                }
            }
            resource.release();
            Ok(Flow::Continue(()))
        })
    }

    /// Bracket a resource around the stream `body` builds from it.
    pub fn using<V, A, B>(acquire: A, body: B) -> Self
    where
        A: Fn() -> Result<ScopedResource<V>> + Send + Sync + 'static,
        B: Fn(&mut V) -> Stream<T> + Send + Sync + 'static,
    {
        Self::new(move |sink| {
            let mut resource = acquire()?;
            let inner = body(&mut *resource);
            let flow = inner.drive(sink)?;
            resource.release();
            Ok(flow)
        })
    }

    /// Sequencing: for each value, splice in the stream `f` builds from it.
    pub fn then<U, F>(self, f: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> Stream<U> + Send + Sync + 'static,
    {
        Stream::new(move |sink| self.drive(&mut |item| f(item).drive(&mut *sink)))
    }

    pub fn map<U, F>(self, f: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Stream::new(move |sink| self.drive(&mut |item| sink(f(item))))
    }

    /// Fallible map: an `Err` from `f` halts the pipeline.
    pub fn and_then<U, F>(self, f: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        Stream::new(move |sink| self.drive(&mut |item| sink(f(item)?)))
    }

    pub fn filter<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::new(move |sink| {
            self.drive(&mut |item| {
                if predicate(&item) {
                    sink(item)
                } else {
                    Ok(Flow::Continue(()))
                }
            })
        })
    }

    pub fn filter_map<U, F>(self, f: F) -> Stream<U>
    where
        U: 'static,
        F: Fn(T) -> Option<U> + Send + Sync + 'static,
    {
        Stream::new(move |sink| {
            self.drive(&mut |item| match f(item) {
                Some(mapped) => sink(mapped),
                None => Ok(Flow::Continue(())),
            })
        })
    }

    /// Run `f` on each value as it passes through.
    pub fn inspect<F>(self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self::new(move |sink| {
            self.drive(&mut |item| {
                f(&item);
                sink(item)
            })
        })
    }

    /// All of `self`, then all of `next`.
    pub fn concat(self, next: Stream<T>) -> Self {
        Self::new(move |sink| {
            if self.drive(sink)?.is_break() {
                return Ok(Flow::Break(()));
            }
            next.drive(sink)
        })
    }

    /// Drive each stream to completion before starting the next.
    pub fn concat_all(streams: Vec<Stream<T>>) -> Self {
        Self::new(move |sink| {
            for stream in &streams {
                if stream.drive(sink)?.is_break() {
                    return Ok(Flow::Break(()));
                }
            }
            Ok(Flow::Continue(()))
        })
    }

    /// Left-biased choice: every value of `self`, then every value of
    /// `other`. Deterministic even when either side blocks or never ends.
    pub fn choice(self, other: Stream<T>) -> Self {
        self.concat(other)
    }

    /// At most the first `n` values. Reaching the limit ends this stream
    /// normally, so anything concatenated after it still runs.
    pub fn limit(self, n: usize) -> Self {
        Self::new(move |sink| {
            if n == 0 {
                return Ok(Flow::Continue(()));
            }
            let mut seen = 0;
            let mut consumer_stopped = false;
            self.drive(&mut |item| {
                seen += 1;
                if sink(item)?.is_break() {
                    consumer_stopped = true;
                    return Ok(Flow::Break(()));
                }
                if seen >= n {
                    Ok(Flow::Break(()))
                } else {
                    Ok(Flow::Continue(()))
                }
            })?;
            Ok(if consumer_stopped {
                Flow::Break(())
            } else {
                Flow::Continue(())
            })
        })
    }

    /// Values up to, not including, the first one failing `predicate`.
    pub fn take_while<P>(self, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::new(move |sink| {
            let mut consumer_stopped = false;
            self.drive(&mut |item| {
                if !predicate(&item) {
                    return Ok(Flow::Break(()));
                }
                let flow = sink(item)?;
                consumer_stopped = flow.is_break();
                Ok(flow)
            })?;
            Ok(if consumer_stopped {
                Flow::Break(())
            } else {
                Flow::Continue(())
            })
        })
    }

    pub fn count(&self) -> Result<usize> {
        self.run(fold::Count::default())
    }

    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.run(fold::ToVec::default())
    }

    /// The first value; stops the source right after it.
    pub fn first(&self) -> Result<Option<T>> {
        self.run(fold::First::default())
    }

    pub fn last(&self) -> Result<Option<T>> {
        self.run(fold::Last::default())
    }

    /// True when the stream produces nothing. Pulls at most one value.
    pub fn is_empty(&self) -> Result<bool> {
        self.run(fold::IsEmpty::default())
    }

    /// Drive the stream for its effects.
    pub fn for_each(&self, f: impl FnMut(T)) -> Result<()> {
        self.run(fold::ForEach::new(f))
    }
}

impl<T: Clone + Send + Sync + 'static> FromIterator<T> for Stream<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        Self::new(move |sink| {
            for item in &items {
                if sink(item.clone())?.is_break() {
                    return Ok(Flow::Break(()));
                }
            }
            Ok(Flow::Continue(()))
        })
    }
}

/// Lines read from the scoped reader `acquire` opens, without their
/// trailing newline.
pub fn lines<R, A>(acquire: A) -> Stream<String>
where
    R: BufRead + 'static,
    A: Fn() -> Result<ScopedResource<R>> + Send + Sync + 'static,
{
    Stream::unfold_scoped(acquire, |reader: &mut R| read_line(reader))
}

/// Read one line, stripping the trailing `\n`. `None` at end of input.
pub(crate) fn read_line<R: BufRead + ?Sized>(reader: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    if line.ends_with('\n') {
        line.pop();
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbers(n: u32) -> Stream<u32> {
        (1..=n).collect()
    }

    fn naturals() -> Stream<u32> {
        Stream::generate(|| Ok(0u32), |n| {
            *n += 1;
            Ok(Some(*n))
        })
    }

    #[test]
    fn empty_and_once() {
        assert!(Stream::<u32>::empty().is_empty().unwrap());
        assert_eq!(Stream::once("a").to_vec().unwrap(), vec!["a"]);
    }

    #[test]
    fn rerun_starts_from_scratch() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&pulls);
        let s = Stream::from_effect(move || Ok(p.fetch_add(1, Ordering::SeqCst)));
        assert_eq!(s.to_vec().unwrap(), vec![0]);
        assert_eq!(s.to_vec().unwrap(), vec![1]);
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effects_happen_only_when_pulled() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let s = numbers(3).inspect(move |n| l.lock().unwrap().push(format!("made {n}")));
        let l = Arc::clone(&log);
        s.for_each(|n| l.lock().unwrap().push(format!("got {n}")))
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["made 1", "got 1", "made 2", "got 2", "made 3", "got 3"]
        );
    }

    #[test]
    fn then_preserves_order() {
        let s = numbers(3).then(|n| (0..n).map(move |i| n * 10 + i).collect());
        assert_eq!(s.to_vec().unwrap(), vec![10, 20, 21, 30, 31, 32]);
    }

    #[test]
    fn concat_and_choice_are_left_first() {
        let s = numbers(2).concat(Stream::once(9));
        assert_eq!(s.to_vec().unwrap(), vec![1, 2, 9]);
        let c = Stream::once(9).choice(numbers(2));
        assert_eq!(c.to_vec().unwrap(), vec![9, 1, 2]);
        let all = Stream::concat_all(vec![numbers(1), Stream::empty(), numbers(2)]);
        assert_eq!(all.to_vec().unwrap(), vec![1, 1, 2]);
    }

    #[test]
    fn limit_bounds_an_infinite_source() {
        assert_eq!(naturals().limit(4).to_vec().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(naturals().limit(0).count().unwrap(), 0);
    }

    #[test]
    fn limit_then_concat_keeps_going() {
        let s = naturals().limit(2).concat(Stream::once(100));
        assert_eq!(s.to_vec().unwrap(), vec![1, 2, 100]);
    }

    #[test]
    fn take_while_stops_at_first_failure() {
        let s = naturals().take_while(|n| *n < 4);
        assert_eq!(s.to_vec().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn repeat_with_is_infinite_until_stopped() {
        let s = Stream::repeat_with(|| Ok("y"));
        assert_eq!(s.clone().limit(3).count().unwrap(), 3);
        assert_eq!(s.first().unwrap(), Some("y"));
    }

    #[test]
    fn filter_and_filter_map() {
        let evens = numbers(6).filter(|n| n % 2 == 0);
        assert_eq!(evens.to_vec().unwrap(), vec![2, 4, 6]);
        let halves = numbers(6).filter_map(|n| (n % 3 == 0).then_some(n / 3));
        assert_eq!(halves.to_vec().unwrap(), vec![1, 2]);
    }

    #[test]
    fn counting_fold_counts_produced_values() {
        assert_eq!(numbers(7).count().unwrap(), 7);
        assert_eq!(naturals().limit(5).count().unwrap(), 5);
    }

    #[derive(Clone)]
    struct Counter(Arc<AtomicUsize>);

    impl Counter {
        fn bump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_source(releases: &Counter) -> Stream<u32> {
        let releases = releases.clone();
        Stream::unfold_scoped(
            move || {
                let r = releases.clone();
                Ok(ScopedResource::acquire("counting", 0u32, move |_| r.bump()))
            },
            |n| {
                *n += 1;
                Ok(Some(*n))
            },
        )
    }

    #[test]
    fn early_stop_releases_before_finish() {
        let releases = Counter(Arc::new(AtomicUsize::new(0)));
        let r = releases.clone();
        let seen_at_finish = counting_source(&releases)
            .fold(
                0u32,
                |acc, n| {
                    if n == 3 {
                        ControlFlow::Break(acc + n)
                    } else {
                        ControlFlow::Continue(acc + n)
                    }
                },
                move |acc| (acc, r.0.load(Ordering::SeqCst)),
            )
            .unwrap();
        assert_eq!(seen_at_finish, (6, 1));
    }

    #[test]
    fn abandoned_inner_sources_release() {
        let releases = Counter(Arc::new(AtomicUsize::new(0)));
        let r = releases.clone();
        let s = numbers(3).then(move |_| counting_source(&r));
        assert_eq!(s.limit(5).count().unwrap(), 5);
        assert_eq!(releases.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_propagate_and_release() {
        let releases = Counter(Arc::new(AtomicUsize::new(0)));
        let s = counting_source(&releases).and_then(|n| {
            if n == 2 {
                Err(Error::TaskPanicked("boom".into()))
            } else {
                Ok(n)
            }
        });
        assert!(s.to_vec().is_err());
        assert_eq!(releases.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn using_releases_after_body() {
        let releases = Counter(Arc::new(AtomicUsize::new(0)));
        let r = releases.clone();
        let s = Stream::using(
            move || {
                let r = r.clone();
                Ok(ScopedResource::acquire("value", 5u32, move |_| r.bump()))
            },
            |v| numbers(*v),
        );
        assert_eq!(s.first().unwrap(), Some(1));
        assert_eq!(s.count().unwrap(), 5);
        assert_eq!(releases.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn using_releases_when_consumer_panics() {
        let releases = Counter(Arc::new(AtomicUsize::new(0)));
        let r = releases.clone();
        let s = Stream::using(
            move || {
                let r = r.clone();
                Ok(ScopedResource::acquire("value", 3u32, move |_| r.bump()))
            },
            |v| numbers(*v),
        );
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            s.for_each(|n| {
                if n == 2 {
                    panic!("consumer blew up");
                }
            })
        }));
        assert!(outcome.is_err());
        assert_eq!(releases.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_line_strips_newline() {
        let mut input = std::io::Cursor::new("one\ntwo\n\nlast");
        let mut got = Vec::new();
        while let Some(line) = read_line(&mut input).unwrap() {
            got.push(line);
        }
        assert_eq!(got, vec!["one", "two", "", "last"]);
    }
}
