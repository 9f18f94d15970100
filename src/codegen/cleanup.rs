use super::Emitter;
use crate::ir::{IrType, VReg};
use std::{
    collections::HashSet,
    ops::{Deref, DerefMut},
};

/// A deferred runtime call releasing one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleanup {
    pub func: &'static str,
    pub value: VReg,
    /// `value` is a slot; the handle is loaded with this type first.
    pub indirect: Option<IrType>,
}

impl Cleanup {
    pub fn direct(func: &'static str, value: VReg) -> Self {
        Self {
            func,
            value,
            indirect: None,
        }
    }

    pub fn slot(func: &'static str, slot: VReg) -> Self {
        Self {
            func,
            value: slot,
            indirect: Some(IrType::handle()),
        }
    }
}

/// One frame per lexical block. Releases run innermost frame first, and
/// within a frame in reverse registration order.
#[derive(Debug, Default)]
pub struct CleanupStack {
    frames: Vec<Vec<Cleanup>>,
    ignored: HashSet<VReg>,
}

impl CleanupStack {
    pub fn push_frame(&mut self) {
        self.frames.push(vec![]);
    }

    /// Removes the innermost frame and returns its releases in run order.
    pub fn pop_frame(&mut self) -> Vec<Cleanup> {
        let frame = self.frames.pop().unwrap_or_default();
        self.live(frame.iter().rev())
    }

    pub fn register(&mut self, cleanup: Cleanup) {
        log::trace!("cleanup {} for {}", cleanup.func, cleanup.value);
        if let Some(frame) = self.frames.last_mut() {
            frame.push(cleanup);
        }
    }

    /// Exempts `value` from every release, e.g. a string being returned.
    pub fn ignore(&mut self, value: VReg) {
        self.ignored.insert(value);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Releases of every frame above `depth`, in run order, leaving the
    /// frames in place.
    pub fn pending_from(&self, depth: usize) -> Vec<Cleanup> {
        let frames = self.frames.get(depth..).unwrap_or(&[]);
        self.live(frames.iter().rev().flat_map(|f| f.iter().rev()))
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.ignored.clear();
    }

    fn live<'a>(&self, it: impl Iterator<Item = &'a Cleanup>) -> Vec<Cleanup> {
        it.filter(|c| !self.ignored.contains(&c.value))
            .cloned()
            .collect()
    }
}

/// Holds a cleanup frame open for as long as it lives. Dropping it closes
/// the frame and emits its releases unless the current block has already
/// left through a terminator or cannot be reached.
pub(crate) struct FrameGuard<'a, 'p> {
    emitter: &'a mut Emitter<'p>,
}

impl<'a, 'p> FrameGuard<'a, 'p> {
    pub fn new(emitter: &'a mut Emitter<'p>) -> Self {
        emitter.cleanups.push_frame();
        Self { emitter }
    }
}

impl<'p> Deref for FrameGuard<'_, 'p> {
    type Target = Emitter<'p>;

    fn deref(&self) -> &Self::Target {
        &*self.emitter
    }
}

impl<'p> DerefMut for FrameGuard<'_, 'p> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.emitter
    }
}

impl Drop for FrameGuard<'_, '_> {
    fn drop(&mut self) {
        let pending = self.emitter.cleanups.pop_frame();
        let b = &self.emitter.b;
        if !b.is_terminated() && b.is_reachable() {
            self.emitter.emit_cleanups(&pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_release_in_reverse() {
        let mut s = CleanupStack::default();
        s.push_frame();
        s.register(Cleanup::direct("free", VReg(1)));
        s.push_frame();
        s.register(Cleanup::direct("free", VReg(2)));
        s.register(Cleanup::direct("free", VReg(3)));

        let all: Vec<_> = s.pending_from(0).into_iter().map(|c| c.value).collect();
        assert_eq!(all, vec![VReg(3), VReg(2), VReg(1)]);

        let inner: Vec<_> = s.pop_frame().into_iter().map(|c| c.value).collect();
        assert_eq!(inner, vec![VReg(3), VReg(2)]);
        assert_eq!(s.depth(), 1);
    }

    #[test]
    fn ignored_values_survive() {
        let mut s = CleanupStack::default();
        s.push_frame();
        s.register(Cleanup::direct("free", VReg(1)));
        s.register(Cleanup::direct("free", VReg(2)));
        s.ignore(VReg(2));
        let left: Vec<_> = s.pop_frame().into_iter().map(|c| c.value).collect();
        assert_eq!(left, vec![VReg(1)]);
    }

    #[test]
    fn pending_from_inner_depth() {
        let mut s = CleanupStack::default();
        s.push_frame();
        s.register(Cleanup::direct("free", VReg(1)));
        let depth = s.depth();
        s.push_frame();
        s.register(Cleanup::slot("free", VReg(7)));
        let loop_exit = s.pending_from(depth);
        assert_eq!(loop_exit.len(), 1);
        assert_eq!(loop_exit[0].indirect, Some(IrType::handle()));
    }
}
