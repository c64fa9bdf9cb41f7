//! Stateless `map`/`filter`/`flatMap` (`4.3 Transform Operators`).
//!
//! All three have exactly one input ordinal (0) and one output ordinal (0). They
//! ignore watermarks as data but forward every one of them, in order, to stay out of
//! the way of whatever windowing sits downstream.
//!
//! Every operator here requires its input item type to be `Clone`: on backpressure it
//! must leave the inbox untouched and retry next call, which means computing the
//! candidate output again from a *peeked*, not *polled*, item.

use crate::context::Context;
use crate::inbox::Inbox;
use crate::item::Edge;
use crate::outbox::Outbox;
use crate::processor::Processor;
use crate::traverser::Traverser;
use weir_error::ProcessorError;

const OUT: usize = 0;

/// Emits `f(item)` when it returns `Some`, nothing when it returns `None` — so a
/// `map` that sometimes drops an item is just `filter_map` under another name.
pub struct Map<In, Out, F> {
    f: F,
    _marker: std::marker::PhantomData<fn(In) -> Out>,
}

impl<In, Out, F> Map<In, Out, F>
where
    F: FnMut(In) -> Option<Out> + Send,
{
    pub fn new(f: F) -> Self {
        Map {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<In, Out, F> Processor for Map<In, Out, F>
where
    In: Send + Clone,
    Out: Send,
    F: FnMut(In) -> Option<Out> + Send,
{
    type In = In;
    type Out = Out;

    fn is_cooperative(&self) -> bool {
        true
    }

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Self::In>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<(), ProcessorError> {
        while let Some(item) = inbox.peek() {
            match item {
                Edge::Watermark(wm) => {
                    let wm = *wm;
                    if !outbox.offer(OUT, Edge::Watermark(wm))? {
                        return Ok(());
                    }
                    inbox.poll();
                }
                Edge::Data(data) => {
                    let data = data.clone();
                    match (self.f)(data) {
                        None => {
                            inbox.poll();
                        }
                        Some(out) => {
                            if !outbox.offer(OUT, Edge::Data(out))? {
                                return Ok(());
                            }
                            inbox.poll();
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Emits `item` iff `predicate(item)` holds.
pub struct Filter<T, P> {
    predicate: P,
    _marker: std::marker::PhantomData<fn(T)>,
}

impl<T, P> Filter<T, P>
where
    P: FnMut(&T) -> bool + Send,
{
    pub fn new(predicate: P) -> Self {
        Filter {
            predicate,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T, P> Processor for Filter<T, P>
where
    T: Send + Clone,
    P: FnMut(&T) -> bool + Send,
{
    type In = T;
    type Out = T;

    fn is_cooperative(&self) -> bool {
        true
    }

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Self::In>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<(), ProcessorError> {
        while let Some(item) = inbox.peek() {
            match item {
                Edge::Watermark(wm) => {
                    let wm = *wm;
                    if !outbox.offer(OUT, Edge::Watermark(wm))? {
                        return Ok(());
                    }
                    inbox.poll();
                }
                Edge::Data(data) => {
                    if !(self.predicate)(data) {
                        inbox.poll();
                        continue;
                    }
                    let data = data.clone();
                    if !outbox.offer(OUT, Edge::Data(data))? {
                        return Ok(());
                    }
                    inbox.poll();
                }
            }
        }
        Ok(())
    }
}

/// Expands `item` into a [`Traverser`] and drains it into the outbox. If the outbox
/// refuses an item mid-drain, the traverser is retained and resumed on the next
/// `process` call rather than re-expanded (`9 Design Notes`, "Resumable traversers").
pub struct FlatMap<In, Out, Tr, F> {
    expand: F,
    pending: Option<(Tr, Option<Out>)>,
    _marker: std::marker::PhantomData<fn(In)>,
}

impl<In, Out, Tr, F> FlatMap<In, Out, Tr, F>
where
    Tr: Traverser<Item = Out>,
    F: FnMut(In) -> Tr + Send,
{
    pub fn new(expand: F) -> Self {
        FlatMap {
            expand,
            pending: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Drains `self.pending`, returning `true` once it is fully exhausted (or there
    /// was nothing pending) and `false` if it stopped because the outbox refused.
    /// Keeps the last item pulled from the traverser but not yet accepted so it is
    /// never silently dropped.
    fn drain_pending(&mut self, outbox: &mut Outbox<Out>) -> Result<bool, ProcessorError>
    where
        Out: Clone,
    {
        loop {
            let Some((traverser, held)) = self.pending.as_mut() else {
                return Ok(true);
            };
            let out = match held.take() {
                Some(out) => out,
                None => match traverser.next() {
                    Some(out) => out,
                    None => {
                        self.pending = None;
                        return Ok(true);
                    }
                },
            };
            if outbox.offer(OUT, Edge::Data(out.clone()))? {
                continue;
            }
            self.pending.as_mut().unwrap().1 = Some(out);
            return Ok(false);
        }
    }
}

impl<In, Out, Tr, F> Processor for FlatMap<In, Out, Tr, F>
where
    In: Send,
    Out: Send + Clone,
    Tr: Traverser<Item = Out> + Send,
    F: FnMut(In) -> Tr + Send,
{
    type In = In;
    type Out = Out;

    fn is_cooperative(&self) -> bool {
        true
    }

    fn process(
        &mut self,
        _ordinal: usize,
        inbox: &mut Inbox<Self::In>,
        outbox: &mut Outbox<Self::Out>,
    ) -> Result<(), ProcessorError> {
        if !self.drain_pending(outbox)? {
            return Ok(());
        }
        while let Some(item) = inbox.peek() {
            match item {
                Edge::Watermark(wm) => {
                    let wm = *wm;
                    if !outbox.offer(OUT, Edge::Watermark(wm))? {
                        return Ok(());
                    }
                    inbox.poll();
                }
                Edge::Data(_) => {
                    let Edge::Data(data) = inbox.poll().unwrap() else {
                        unreachable!()
                    };
                    self.pending = Some(((self.expand)(data), None));
                    if !self.drain_pending(outbox)? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}
