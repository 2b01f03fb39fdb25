//! Atoms: the values carried by control messages and object arguments.
//!
//! An object box's text is parsed into atoms separated by whitespace. The
//! first atom names the class, the rest are its arguments:
//!
//! ```rust
//! use patchbay_engine::Atom;
//!
//! let atoms = Atom::parse("+~ 0.5");
//! assert_eq!(atoms, vec![Atom::symbol("+~"), Atom::Float(0.5)]);
//! ```

use std::fmt;

/// One value of a control message.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    /// Integer number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Any token that is not a number.
    Symbol(String),
}

impl Atom {
    /// Creates a symbol atom.
    pub fn symbol(text: impl Into<String>) -> Self {
        Atom::Symbol(text.into())
    }

    /// The `bang` symbol.
    pub fn bang() -> Self {
        Atom::symbol("bang")
    }

    /// Parses one whitespace-free token.
    pub fn from_token(token: &str) -> Self {
        let numeric = token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
        if numeric {
            if let Ok(v) = token.parse::<i64>() {
                return Atom::Int(v);
            }
            if let Ok(v) = token.parse::<f64>() {
                return Atom::Float(v);
            }
        }
        Atom::Symbol(token.to_string())
    }

    /// Splits `text` on whitespace and parses every token.
    pub fn parse(text: &str) -> Vec<Atom> {
        text.split_whitespace().map(Atom::from_token).collect()
    }

    /// Joins atoms back into box text.
    pub fn join(atoms: &[Atom]) -> String {
        atoms
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Returns true for `Int` and `Float`.
    pub fn is_number(&self) -> bool {
        matches!(self, Atom::Int(_) | Atom::Float(_))
    }

    /// Returns true for the `bang` symbol.
    pub fn is_bang(&self) -> bool {
        self.as_symbol() == Some("bang")
    }

    /// Returns the number as `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Atom::Int(v) => Some(*v as f64),
            Atom::Float(v) => Some(*v),
            Atom::Symbol(_) => None,
        }
    }

    /// Returns the number as `i64`, truncating floats.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Atom::Int(v) => Some(*v),
            Atom::Float(v) => Some(*v as i64),
            Atom::Symbol(_) => None,
        }
    }

    /// Returns the symbol text.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Atom::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Int(v) => write!(f, "{v}"),
            Atom::Float(v) => write!(f, "{v}"),
            Atom::Symbol(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Atom {
    fn from(v: i64) -> Self {
        Atom::Int(v)
    }
}

impl From<f64> for Atom {
    fn from(v: f64) -> Self {
        Atom::Float(v)
    }
}

impl From<&str> for Atom {
    fn from(v: &str) -> Self {
        Atom::symbol(v)
    }
}
