//! Placeholder for boxes whose object could not be created.
//!
//! It keeps the pin counts recorded in the document so existing links stay
//! attached, and ignores every message.

use crate::atom::Atom;
use crate::error::ArgumentError;
use crate::object::{Context, Object, PinKind};

use super::{at_most, number_arg};

/// An inert box with control pins only.
pub struct ErrorBox {
    inlets: Vec<PinKind>,
    outlets: Vec<PinKind>,
}

impl ErrorBox {
    /// Creates a placeholder with the given pin counts.
    pub fn with_pins(inlets: usize, outlets: usize) -> Self {
        Self {
            inlets: vec![PinKind::Control; inlets],
            outlets: vec![PinKind::Control; outlets],
        }
    }

    /// Constructor for `errorbox [inlets] [outlets]`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        at_most(args, 2)?;
        let count = |index| -> Result<usize, ArgumentError> {
            Ok(number_arg(args, index)?.map_or(0, |n| n.max(0.0) as usize))
        };
        Ok(Box::new(Self::with_pins(count(0)?, count(1)?)))
    }
}

impl Object for ErrorBox {
    fn inlets(&self) -> &[PinKind] {
        &self.inlets
    }

    fn outlets(&self) -> &[PinKind] {
        &self.outlets
    }

    fn receive(&mut self, _inlet: usize, _message: &[Atom], _cx: &mut Context<'_>) {}
}
