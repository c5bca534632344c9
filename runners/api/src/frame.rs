//! Frame-in-flight slots and the radix sort's ping-pong parity.

use core::ops::{Index, IndexMut};

/// Which of the K per-frame buffer sets a frame writes. Cycles modulo the frames in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameSlot(usize);

impl FrameSlot {
    /// The slot with the given index.
    #[inline]
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position in a [`FrameSlots`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    /// The slot used by the frame after this one.
    #[inline]
    #[must_use]
    pub const fn next(self, frames_in_flight: usize) -> Self {
        Self((self.0 + 1) % frames_in_flight)
    }

    /// The slot written by the frame before this one.
    #[inline]
    #[must_use]
    pub const fn previous(self, frames_in_flight: usize) -> Self {
        Self((self.0 + frames_in_flight - 1) % frames_in_flight)
    }
}

/// One `T` per frame-in-flight slot.
#[derive(Debug, Clone)]
pub struct FrameSlots<T> {
    /// Indexed by `FrameSlot::index()`
    items: Vec<T>,
}

impl<T> FrameSlots<T> {
    /// Build every slot's item.
    #[inline]
    pub fn from_fn(count: usize, mut build: impl FnMut(FrameSlot) -> T) -> Self {
        Self {
            items: (0..count).map(|index| build(FrameSlot(index))).collect(),
        }
    }

    /// Build every slot's item, stopping at the first failure.
    #[inline]
    pub fn try_from_fn<E>(
        count: usize,
        mut build: impl FnMut(FrameSlot) -> Result<T, E>,
    ) -> Result<Self, E> {
        Ok(Self {
            items: (0..count)
                .map(|index| build(FrameSlot(index)))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no slots at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item of `slot`, if there is such a slot.
    #[inline]
    pub fn get(&self, slot: FrameSlot) -> Option<&T> {
        self.items.get(slot.0)
    }

    /// Every slot with its item.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (FrameSlot, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (FrameSlot(index), item))
    }

    /// Read one slot while writing another. `None` if they're the same slot or out of range.
    #[inline]
    pub fn pair_mut(&mut self, read: FrameSlot, write: FrameSlot) -> Option<(&T, &mut T)> {
        if read.0 == write.0 || read.0 >= self.items.len() || write.0 >= self.items.len() {
            return None;
        }

        if read.0 < write.0 {
            let (head, tail) = self.items.split_at_mut(write.0);
            Some((head.get(read.0)?, tail.first_mut()?))
        } else {
            let (head, tail) = self.items.split_at_mut(read.0);
            let write_item = head.get_mut(write.0)?;
            Some((tail.first()?, write_item))
        }
    }
}

impl<T> Index<FrameSlot> for FrameSlots<T> {
    type Output = T;

    #[expect(
        clippy::indexing_slicing,
        reason = "Slots only come from rotating within the frames in flight"
    )]
    #[inline]
    fn index(&self, slot: FrameSlot) -> &Self::Output {
        &self.items[slot.0]
    }
}

impl<T> IndexMut<FrameSlot> for FrameSlots<T> {
    #[expect(
        clippy::indexing_slicing,
        reason = "Slots only come from rotating within the frames in flight"
    )]
    #[inline]
    fn index_mut(&mut self, slot: FrameSlot) -> &mut Self::Output {
        &mut self.items[slot.0]
    }
}

/// Which of the two sorted index buffers is the source of a radix pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Parity {
    /// Buffer 0 is read, buffer 1 written
    Even,
    /// Buffer 1 is read, buffer 0 written
    Odd,
}

impl Parity {
    /// Both parities, in buffer order.
    pub const ALL: [Self; 2] = [Self::Even, Self::Odd];

    /// The parity in effect once `passes` digit passes have completed. Also the parity of the
    /// next pass.
    #[inline]
    #[must_use]
    pub const fn after_passes(passes: u32) -> Self {
        if passes % 2 == 0 {
            Self::Even
        } else {
            Self::Odd
        }
    }

    /// The sorted buffer holding the valid permutation.
    #[inline]
    #[must_use]
    pub const fn source_index(self) -> usize {
        match self {
            Self::Even => 0,
            Self::Odd => 1,
        }
    }

    /// The sorted buffer that a pass writes.
    #[inline]
    #[must_use]
    pub const fn destination_index(self) -> usize {
        match self {
            Self::Even => 1,
            Self::Odd => 0,
        }
    }
}
