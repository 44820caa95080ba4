use num_traits::{One, PrimInt};

/// Trait implemented by flag enums declared with [`define_bitmask_flags!`].
///
/// The enum's discriminant (via `#[repr(u8)]`) determines the bit index.
pub trait FlagBitmask: Copy {
    type Storage: PrimInt;

    fn bit_index(self) -> u8;

    fn mask(self) -> Self::Storage {
        // NOTE: `bit_index()` must be < number of bits in `Storage`.
        Self::Storage::one() << (self.bit_index() as usize)
    }
}

/// A plain bitmask container keyed by a flag enum.
///
/// Used for per-processor stage validity, the agent feature set and the
/// replicated settings words.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BitmaskFlags<T: PrimInt> {
    pub bits: T,
}

impl<T: PrimInt> BitmaskFlags<T> {
    pub fn new(bits: T) -> Self {
        Self { bits }
    }

    pub fn empty() -> Self {
        Self { bits: T::zero() }
    }

    pub fn from_tags<U: FlagBitmask<Storage = T>>(tags: &[U]) -> Self {
        let mut flags = Self::empty();
        flags.add_many(tags);
        flags
    }

    // --- Single Tag Operations ---
    pub fn add<U: FlagBitmask<Storage = T>>(&mut self, tag: U) {
        self.bits = self.bits | tag.mask();
    }

    pub fn remove<U: FlagBitmask<Storage = T>>(&mut self, tag: U) {
        self.bits = self.bits & !tag.mask();
    }

    pub fn set<U: FlagBitmask<Storage = T>>(&mut self, tag: U, enabled: bool) {
        if enabled {
            self.add(tag);
        } else {
            self.remove(tag);
        }
    }

    pub fn has<U: FlagBitmask<Storage = T>>(&self, tag: U) -> bool {
        (self.bits & tag.mask()) != T::zero()
    }

    /// Builder-style [`BitmaskFlags::add`].
    pub fn with<U: FlagBitmask<Storage = T>>(mut self, tag: U) -> Self {
        self.add(tag);
        self
    }

    /// Builder-style [`BitmaskFlags::remove`].
    pub fn without<U: FlagBitmask<Storage = T>>(mut self, tag: U) -> Self {
        self.remove(tag);
        self
    }

    // --- Bulk Operations ---
    pub fn add_many<U: FlagBitmask<Storage = T>>(&mut self, tags: &[U]) {
        for &tag in tags {
            self.add(tag);
        }
    }

    // --- Logic Gates ---
    pub fn has_all<U: FlagBitmask<Storage = T>>(&self, tags: &[U]) -> bool {
        let combined = tags.iter().fold(T::zero(), |acc, t| acc | t.mask());
        (self.bits & combined) == combined
    }

    pub fn has_any<U: FlagBitmask<Storage = T>>(&self, tags: &[U]) -> bool {
        let combined = tags.iter().fold(T::zero(), |acc, t| acc | t.mask());
        (self.bits & combined) != T::zero()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == T::zero()
    }

    pub fn clear(&mut self) {
        self.bits = T::zero();
    }
}

/// Declare a bitmask-backed enum and implement `FlagBitmask` for it.
///
/// Also emits `ALL` (every variant, declaration order) on the enum.
///
/// Example:
/// ```text
/// define_bitmask_flags!(Feature, u8, {
///     StepUp,
///     SnapToGround,
/// });
/// ```
#[macro_export]
macro_rules! define_bitmask_flags {
    ($(#[$meta:meta])* $name:ident, $storage:ty, { $($(#[$vmeta:meta])* $variant:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant),*
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),*];
        }

        impl $crate::bitmask_flags::FlagBitmask for $name {
            type Storage = $storage;

            fn bit_index(self) -> u8 {
                self as u8
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    define_bitmask_flags!(Probe, u16, {
        First,
        Second,
        Third,
    });

    #[test]
    fn add_remove_and_query_single_tags() {
        let mut flags = BitmaskFlags::<u16>::empty();
        flags.add(Probe::Second);
        assert!(flags.has(Probe::Second));
        assert!(!flags.has(Probe::First));
        assert_eq!(flags.bits, 0b010);

        flags.set(Probe::Third, true);
        flags.remove(Probe::Second);
        assert_eq!(flags.bits, 0b100);
    }

    #[test]
    fn all_lists_variants_in_declaration_order() {
        assert_eq!(Probe::ALL, &[Probe::First, Probe::Second, Probe::Third]);
        let all = BitmaskFlags::from_tags(Probe::ALL);
        assert!(all.has_all(Probe::ALL));
        assert!(!BitmaskFlags::<u16>::empty().has_any(Probe::ALL));
    }
}
