//! Built-in object classes.
//!
//! | Class | Kind | Pins |
//! |-------|------|------|
//! | `+`, `*` | control | 2 in, 1 out |
//! | `print` | control | 1 in |
//! | `bang`, `pass` | control | 1 in, 1 out |
//! | `loadmess` | control | 1 in, 1 out |
//! | `sig~` | signal | 1 control in, 1 signal out |
//! | `+~`, `*~` | signal | 2 signal in, 1 signal out |
//! | `adc~` | signal | 1 control in, one signal out per channel |
//! | `dac~` | signal | one signal in per channel |
//! | `errorbox` | placeholder | as many pins as the box it replaces |

pub mod control;
pub mod errorbox;
pub mod io;
pub mod signal;

pub use control::{Bang, LoadMess, Operator, Pass, Print};
pub use errorbox::ErrorBox;
pub use io::{AdcTilde, DacTilde, MAX_CHANNELS, parse_channel_routes};
pub use signal::{OperatorTilde, Scalar, SigTilde};

use crate::atom::Atom;
use crate::error::ArgumentError;

/// Rejects argument lists longer than `max`.
pub(crate) fn at_most(args: &[Atom], max: usize) -> Result<(), ArgumentError> {
    if args.len() > max {
        return Err(ArgumentError::TooMany {
            max,
            got: args.len(),
        });
    }
    Ok(())
}

/// Reads the optional numeric argument at `index`.
pub(crate) fn number_arg(args: &[Atom], index: usize) -> Result<Option<f64>, ArgumentError> {
    match args.get(index) {
        None => Ok(None),
        Some(atom) => atom
            .as_float()
            .map(Some)
            .ok_or_else(|| ArgumentError::NotANumber {
                index,
                got: atom.to_string(),
            }),
    }
}
