// Copyright (c) The bulwark Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Converting tested values into strings for failure messages.
//!
//! Values opt in by implementing [`Describe`]. The comparison macros go
//! through [`to_printable!`](crate::to_printable), which picks `Describe` when
//! the static type implements it and prints [`NON_PRINTABLE`] otherwise:
//!
//! ```
//! use bulwark::to_printable;
//!
//! struct Opaque;
//!
//! assert_eq!(to_printable!(vec![1u8, 2]), "[1, 2]");
//! assert_eq!(to_printable!(Opaque), "<non-printable value>");
//! ```

use std::borrow::Cow;

/// The placeholder printed for values that don't implement [`Describe`].
pub const NON_PRINTABLE: &str = "<non-printable value>";

/// A value that can be shown in a failure message.
pub trait Describe {
    /// Returns the value as it should appear in a failure message.
    fn describe(&self) -> String;
}

macro_rules! describe_via_display {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

describe_via_display!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char,
);

impl Describe for str {
    fn describe(&self) -> String {
        self.to_owned()
    }
}

impl Describe for String {
    fn describe(&self) -> String {
        self.clone()
    }
}

impl Describe for Cow<'_, str> {
    fn describe(&self) -> String {
        self.clone().into_owned()
    }
}

impl<T: Describe + ?Sized> Describe for &T {
    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: Describe + ?Sized> Describe for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe(&self) -> String {
        match self {
            Some(value) => format!("Some({})", value.describe()),
            None => "None".to_owned(),
        }
    }
}

impl<T: Describe> Describe for [T] {
    fn describe(&self) -> String {
        let items: Vec<_> = self.iter().map(Describe::describe).collect();
        format!("[{}]", items.join(", "))
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn describe(&self) -> String {
        self.as_slice().describe()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe(&self) -> String {
        self.as_slice().describe()
    }
}

/// Wraps a value for [`to_printable!`](crate::to_printable).
#[doc(hidden)]
pub struct Printable<'a, T: ?Sized>(pub &'a T);

/// Preferred by method resolution when `T: Describe`.
#[doc(hidden)]
pub trait ViaDescribe {
    fn to_printable(&self) -> String;
}

impl<T: Describe + ?Sized> ViaDescribe for Printable<'_, T> {
    fn to_printable(&self) -> String {
        self.0.describe()
    }
}

/// Reached through one more autoref, so only used when `ViaDescribe` isn't.
#[doc(hidden)]
pub trait ViaFallback {
    fn to_printable(&self) -> String;
}

impl<T: ?Sized> ViaFallback for &Printable<'_, T> {
    fn to_printable(&self) -> String {
        NON_PRINTABLE.to_owned()
    }
}

/// Converts a value to a string with [`Describe`], or to
/// [`NON_PRINTABLE`](crate::describe::NON_PRINTABLE) if its type doesn't implement it.
///
/// The choice is made from the static type at the call site, so inside
/// generic code without a `Describe` bound the fallback is always used.
#[macro_export]
macro_rules! to_printable {
    ($value:expr) => {{
        #[allow(unused_imports)]
        use $crate::describe::{ViaDescribe as _, ViaFallback as _};
        (&$crate::describe::Printable(&$value)).to_printable()
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::to_printable;
    use test_case::test_case;

    struct Opaque;

    struct Celsius(i32);

    impl Describe for Celsius {
        fn describe(&self) -> String {
            format!("{}°C", self.0)
        }
    }

    #[test]
    fn primitives() {
        assert_eq!(to_printable!(42i32), "42");
        assert_eq!(to_printable!(-7i64), "-7");
        assert_eq!(to_printable!(1.5f64), "1.5");
        assert_eq!(to_printable!(true), "true");
        assert_eq!(to_printable!('x'), "x");
        assert_eq!(to_printable!("text"), "text");
        assert_eq!(to_printable!(String::from("owned")), "owned");
    }

    #[test]
    fn containers() {
        assert_eq!(to_printable!(vec![1u32, 2, 3]), "[1, 2, 3]");
        assert_eq!(to_printable!([true, false]), "[true, false]");
        assert_eq!(to_printable!(Some(4u8)), "Some(4)");
        assert_eq!(to_printable!(None::<u8>), "None");
        assert_eq!(to_printable!(Box::new(9i32)), "9");
        let empty: Vec<i32> = Vec::new();
        assert_eq!(to_printable!(empty), "[]");
    }

    #[test]
    fn user_types() {
        assert_eq!(to_printable!(Celsius(21)), "21°C");
        assert_eq!(to_printable!(vec![Celsius(1), Celsius(2)]), "[1°C, 2°C]");
    }

    #[test]
    fn references_are_transparent() {
        let value = 5u16;
        let reference = &value;
        assert_eq!(to_printable!(reference), "5");
        assert_eq!(to_printable!(&reference), "5");
    }

    #[test_case(to_printable!(Opaque) ; "struct")]
    #[test_case(to_printable!(vec![Opaque]) ; "vec of opaque")]
    #[test_case(to_printable!(Some(Opaque)) ; "option of opaque")]
    fn non_printable(printed: String) {
        assert_eq!(printed, NON_PRINTABLE);
    }
}
