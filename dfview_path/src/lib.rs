//! Paths locating a member of a type or global object.
//!
//! A path is a sequence of [PathItem]. The string syntax is:
//! - `name` (or `.name` after the first item): a member or global identifier
//! - `.(name)`: the containing direct member holding `name`
//! - `[3]`: an index into a static array
//! - `[ENUM_VALUE]`: an index by enum value name
//!
//! [parse_path] builds a path at run time; the [path!] macro expands to a
//! fixed-length item array at compile time:
//!
//! ```
//! use dfview_path::{path, parse_path, PathItem};
//!
//! let items = path!(units.active[3].name);
//! assert_eq!(parse_path("units.active[3].name").unwrap(), items);
//! ```

pub use error::PathParseError;
pub use parse::parse_path;

use std::fmt;

use serde::{Deserialize, Serialize};

mod error;
mod parse;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathItem {
    /// A member or global identifier, searched through anonymous nested
    /// compounds.
    Field(String),
    /// The outermost direct member containing the named member.
    ContainerOf(String),
    /// An integer index into a static array.
    Index(usize),
    /// An index into a static array by enum value name.
    EnumIndex(String),
}

impl PathItem {
    /// A member identifier item.
    pub fn field(name: impl Into<String>) -> Self {
        PathItem::Field(name.into())
    }

    /// A container-of item.
    pub fn container_of(name: impl Into<String>) -> Self {
        PathItem::ContainerOf(name.into())
    }

    /// An integer index item.
    pub fn index(index: usize) -> Self {
        PathItem::Index(index)
    }

    /// An enum value name index item.
    pub fn enum_index(name: impl Into<String>) -> Self {
        PathItem::EnumIndex(name.into())
    }
}

/// Displays a path slice using the string syntax accepted by [parse_path].
#[derive(Debug, Clone, Copy)]
pub struct DisplayPath<'a>(pub &'a [PathItem]);

impl fmt::Display for DisplayPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            match item {
                PathItem::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                PathItem::ContainerOf(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "({})", name)?;
                }
                PathItem::Index(index) => write!(f, "[{}]", index)?,
                PathItem::EnumIndex(name) => write!(f, "[{}]", name)?,
            }
        }
        Ok(())
    }
}

/// Build a path as a fixed-length array of [PathItem] at compile time.
#[macro_export]
macro_rules! path {
    ($($rest:tt)+) => {
        $crate::__path_items!([] $($rest)+)
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! __path_items {
    ([$($items:expr,)*]) => {
        [$($items,)*]
    };
    ([$($items:expr,)*] . ( $name:ident ) $($rest:tt)*) => {
        $crate::__path_items!([$($items,)* $crate::PathItem::container_of(stringify!($name)),] $($rest)*)
    };
    ([$($items:expr,)*] . $name:ident $($rest:tt)*) => {
        $crate::__path_items!([$($items,)* $crate::PathItem::field(stringify!($name)),] $($rest)*)
    };
    ([$($items:expr,)*] [ $index:literal ] $($rest:tt)*) => {
        $crate::__path_items!([$($items,)* $crate::PathItem::index($index),] $($rest)*)
    };
    ([$($items:expr,)*] [ $name:ident ] $($rest:tt)*) => {
        $crate::__path_items!([$($items,)* $crate::PathItem::enum_index(stringify!($name)),] $($rest)*)
    };
    ([] ( $name:ident ) $($rest:tt)*) => {
        $crate::__path_items!([$crate::PathItem::container_of(stringify!($name)),] $($rest)*)
    };
    ([] $name:ident $($rest:tt)*) => {
        $crate::__path_items!([$crate::PathItem::field(stringify!($name)),] $($rest)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trip() {
        let sources = [
            "world",
            "units.active[3].name.first_name",
            "plotinfo.(equipment)",
            "(equipment).update",
            "flags[DO_MEGA]",
            "raws.mat_table[SOLID].state",
        ];
        for source in sources {
            let path = parse_path(source).unwrap();
            let printed = DisplayPath(&path).to_string();
            assert_eq!(printed, source);
            assert_eq!(parse_path(&printed).unwrap(), path);
        }
    }

    #[test]
    fn macro_matches_parser() {
        assert_eq!(
            path!(units.active[3].name).to_vec(),
            parse_path("units.active[3].name").unwrap()
        );
        assert_eq!(
            path!(unit.(item_type)[HELM]).to_vec(),
            parse_path("unit.(item_type)[HELM]").unwrap()
        );
        let single = path!(world);
        assert_eq!(single.to_vec(), parse_path("world").unwrap());
    }
}
