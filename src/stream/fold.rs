//! Consumers a [`Stream`](super::Stream) can be run against.

use std::ops::ControlFlow;

use super::Flow;

/// A stateful consumer: `step` once per value in production order, then
/// `finish` exactly once.
///
/// Returning `Break` from `step` stops the producer; resources it opened are
/// released before `finish` is called.
pub trait Fold<T> {
    type Output;

    fn step(&mut self, item: T) -> Flow;

    fn finish(self) -> Self::Output;
}

/// Fold assembled from an initial state plus `step` and `finish` closures.
pub struct FoldFn<S, St, Fi> {
    state: Option<S>,
    step: St,
    finish: Fi,
}

impl<S, St, Fi> FoldFn<S, St, Fi> {
    pub fn new(init: S, step: St, finish: Fi) -> Self {
        Self {
            state: Some(init),
            step,
            finish,
        }
    }
}

impl<T, S, R, St, Fi> Fold<T> for FoldFn<S, St, Fi>
where
    St: FnMut(S, T) -> ControlFlow<S, S>,
    Fi: FnOnce(S) -> R,
{
    type Output = R;

    fn step(&mut self, item: T) -> Flow {
        let Some(state) = self.state.take() else {
            return Flow::Break(());
        };
        match (self.step)(state, item) {
            ControlFlow::Continue(next) => {
                self.state = Some(next);
                Flow::Continue(())
            }
            ControlFlow::Break(last) => {
                self.state = Some(last);
                Flow::Break(())
            }
        }
    }

    fn finish(self) -> R {
        match self.state {
            Some(state) => (self.finish)(state),
            None => unreachable!("fold state is restored after every step"),
        }
    }
}

#[derive(Debug, Default)]
pub struct Count(usize);

impl<T> Fold<T> for Count {
    type Output = usize;

    fn step(&mut self, _: T) -> Flow {
        self.0 += 1;
        Flow::Continue(())
    }

    fn finish(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub struct ToVec<T>(Vec<T>);

impl<T> Default for ToVec<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Fold<T> for ToVec<T> {
    type Output = Vec<T>;

    fn step(&mut self, item: T) -> Flow {
        self.0.push(item);
        Flow::Continue(())
    }

    fn finish(self) -> Vec<T> {
        self.0
    }
}

#[derive(Debug)]
pub struct First<T>(Option<T>);

impl<T> Default for First<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Fold<T> for First<T> {
    type Output = Option<T>;

    fn step(&mut self, item: T) -> Flow {
        self.0 = Some(item);
        Flow::Break(())
    }

    fn finish(self) -> Option<T> {
        self.0
    }
}

#[derive(Debug)]
pub struct Last<T>(Option<T>);

impl<T> Default for Last<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Fold<T> for Last<T> {
    type Output = Option<T>;

    fn step(&mut self, item: T) -> Flow {
        self.0 = Some(item);
        Flow::Continue(())
    }

    fn finish(self) -> Option<T> {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct IsEmpty {
    saw_value: bool,
}

impl<T> Fold<T> for IsEmpty {
    type Output = bool;

    fn step(&mut self, _: T) -> Flow {
        self.saw_value = true;
        Flow::Break(())
    }

    fn finish(self) -> bool {
        !self.saw_value
    }
}

pub struct ForEach<F>(F);

impl<F> ForEach<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F: FnMut(T)> Fold<T> for ForEach<F> {
    type Output = ();

    fn step(&mut self, item: T) -> Flow {
        (self.0)(item);
        Flow::Continue(())
    }

    fn finish(self) {}
}

/// Feeds at most `n` values to `inner`, then stops the producer.
///
/// A fold only sees the producer once a value arrives, so `Bounded::new(0, _)`
/// still lets one value be produced before it breaks. Use
/// [`Stream::limit`](super::Stream::limit) when even that first production
/// effect must not run.
pub struct Bounded<F> {
    remaining: usize,
    inner: F,
}

impl<F> Bounded<F> {
    pub fn new(n: usize, inner: F) -> Self {
        Self {
            remaining: n,
            inner,
        }
    }
}

impl<T, F: Fold<T>> Fold<T> for Bounded<F> {
    type Output = F::Output;

    fn step(&mut self, item: T) -> Flow {
        if self.remaining == 0 {
            return Flow::Break(());
        }
        self.remaining -= 1;
        let flow = self.inner.step(item);
        if self.remaining == 0 {
            Flow::Break(())
        } else {
            flow
        }
    }

    fn finish(self) -> F::Output {
        self.inner.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Stream;

    fn numbers() -> Stream<u32> {
        Stream::generate(|| Ok(0u32), |n| {
            *n += 1;
            Ok(Some(*n))
        })
    }

    #[test]
    fn bounded_takes_first_n_of_infinite() {
        let got = numbers().run(Bounded::new(3, ToVec::default())).unwrap();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn bounded_zero_still_finishes() {
        let got = numbers().run(Bounded::new(0, Count::default())).unwrap();
        assert_eq!(got, 0);
    }

    #[test]
    fn bounded_zero_pulls_one_value_limit_zero_pulls_none() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let pulls = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&pulls);
        let source = Stream::repeat_with(move || Ok(p.fetch_add(1, Ordering::SeqCst)));

        let got = source.run(Bounded::new(0, ToVec::default())).unwrap();
        assert!(got.is_empty());
        assert_eq!(pulls.load(Ordering::SeqCst), 1);

        assert_eq!(source.limit(0).count().unwrap(), 0);
        assert_eq!(pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_stops_infinite_source() {
        assert_eq!(numbers().first().unwrap(), Some(1));
        assert!(!numbers().is_empty().unwrap());
    }

    #[test]
    fn last_of_finite() {
        let s: Stream<u32> = vec![4, 5, 6].into_iter().collect();
        assert_eq!(s.last().unwrap(), Some(6));
        assert_eq!(Stream::<u32>::empty().last().unwrap(), None);
    }

    #[test]
    fn fold_fn_threads_state() {
        let s: Stream<u32> = vec![1, 2, 3, 4].into_iter().collect();
        let total = s
            .fold(0, |acc, n| ControlFlow::Continue(acc + n), |acc| acc * 10)
            .unwrap();
        assert_eq!(total, 100);
    }
}
