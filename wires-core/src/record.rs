//! Reactive records.
//!
//! [`reactive_record!`](crate::reactive_record) declares a plain struct
//! together with a reactive counterpart in which every data field is a
//! [`Signal`](crate::Signal). Fields listed in an optional `callbacks` block
//! are carried over unchanged. The conversion is shallow: a field that is
//! itself a record is wrapped as a single signal.

/// Conversion from a plain record into its reactive counterpart.
///
/// Implemented by [`reactive_record!`](crate::reactive_record).
pub trait MakeReactive: Sized {
    /// The record with every data field wrapped in a signal.
    type Reactive: From<Self>;

    /// Wrap each data field in its own signal.
    fn make_reactive(self) -> Self::Reactive {
        Self::Reactive::from(self)
    }
}

/// Declare a plain record and its reactive counterpart.
///
/// Data field types must be `Clone + 'static`. Attributes before `struct`
/// apply to the plain record only; field attributes apply to both.
///
/// # Example
///
/// ```rust
/// use wires_core::{reactive_record, MakeReactive};
///
/// reactive_record! {
///     #[derive(Debug, Clone)]
///     pub struct Player => ReactivePlayer {
///         pub name: String,
///         pub score: u32,
///     }
///     callbacks {
///         pub describe: fn(u32) -> String,
///     }
/// }
///
/// let player = Player {
///     name: "ada".to_string(),
///     score: 3,
///     describe: |score| format!("{score} points"),
/// }
/// .make_reactive();
///
/// player.score.set(4);
/// assert_eq!((player.describe)(player.score.get()), "4 points");
/// ```
#[macro_export]
macro_rules! reactive_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $plain:ident => $reactive:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $field_ty:ty
            ),* $(,)?
        }
        $(
            callbacks {
                $(
                    $(#[$cb_meta:meta])*
                    $cb_vis:vis $cb:ident : $cb_ty:ty
                ),* $(,)?
            }
        )?
    ) => {
        $(#[$meta])*
        $vis struct $plain {
            $(
                $(#[$field_meta])*
                $field_vis $field: $field_ty,
            )*
            $($(
                $(#[$cb_meta])*
                $cb_vis $cb: $cb_ty,
            )*)?
        }

        #[doc = concat!("Reactive form of [`", stringify!($plain), "`].")]
        $vis struct $reactive {
            $(
                $(#[$field_meta])*
                $field_vis $field: $crate::Signal<$field_ty>,
            )*
            $($(
                $(#[$cb_meta])*
                $cb_vis $cb: $cb_ty,
            )*)?
        }

        impl ::core::convert::From<$plain> for $reactive {
            fn from(record: $plain) -> Self {
                Self {
                    $( $field: $crate::Signal::new(record.$field), )*
                    $($( $cb: record.$cb, )*)?
                }
            }
        }

        impl $crate::MakeReactive for $plain {
            type Reactive = $reactive;
        }
    };
}
