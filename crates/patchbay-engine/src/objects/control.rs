//! Control objects: arithmetic, printing and message plumbing.

use crate::atom::Atom;
use crate::error::ArgumentError;
use crate::object::{Context, Object, PinKind};

use super::{at_most, number_arg};

const ONE: [PinKind; 1] = [PinKind::Control];
const TWO: [PinKind; 2] = [PinKind::Control, PinKind::Control];

/// Binary arithmetic on numbers: `+` and `*`.
///
/// The right inlet stores the right operand (initially the first argument);
/// a number on the left inlet stores the left operand and outputs the result,
/// a bang outputs it again.
pub struct Operator {
    class: &'static str,
    compute: fn(f64, f64) -> f64,
    lhs: f64,
    rhs: f64,
}

impl Operator {
    fn create(
        class: &'static str,
        compute: fn(f64, f64) -> f64,
        args: &[Atom],
    ) -> Result<Box<dyn Object>, ArgumentError> {
        at_most(args, 1)?;
        Ok(Box::new(Self {
            class,
            compute,
            lhs: 0.0,
            rhs: number_arg(args, 0)?.unwrap_or(0.0),
        }))
    }

    /// Constructor for `+`.
    pub fn plus(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        Self::create("+", |a, b| a + b, args)
    }

    /// Constructor for `*`.
    pub fn times(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        Self::create("*", |a, b| a * b, args)
    }

    fn output(&self, cx: &mut Context<'_>) {
        cx.send(0, vec![Atom::Float((self.compute)(self.lhs, self.rhs))]);
    }
}

impl Object for Operator {
    fn inlets(&self) -> &[PinKind] {
        &TWO
    }

    fn outlets(&self) -> &[PinKind] {
        &ONE
    }

    fn receive(&mut self, inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        let Some(first) = message.first() else {
            return;
        };
        match (inlet, first.as_float()) {
            (0, Some(v)) => {
                self.lhs = v;
                self.output(cx);
            }
            (0, None) if first.is_bang() => self.output(cx),
            (1, Some(v)) => self.rhs = v,
            _ => cx.console().warning(format!(
                "{}: inlet {} doesn't understand \"{}\"",
                self.class,
                inlet + 1,
                first
            )),
        }
    }
}

/// Posts every message it receives, prefixed with its argument.
pub struct Print {
    prefix: String,
}

impl Print {
    /// Constructor for `print`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        Ok(Box::new(Self {
            prefix: if args.is_empty() {
                "print".to_string()
            } else {
                Atom::join(args)
            },
        }))
    }
}

impl Object for Print {
    fn inlets(&self) -> &[PinKind] {
        &ONE
    }

    fn outlets(&self) -> &[PinKind] {
        &[]
    }

    fn receive(&mut self, _inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        cx.console()
            .post(format!("{}: {}", self.prefix, Atom::join(message)));
    }
}

/// Turns any message into a bang.
pub struct Bang;

impl Bang {
    /// Constructor for `bang`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        at_most(args, 0)?;
        Ok(Box::new(Self))
    }
}

impl Object for Bang {
    fn inlets(&self) -> &[PinKind] {
        &ONE
    }

    fn outlets(&self) -> &[PinKind] {
        &ONE
    }

    fn receive(&mut self, _inlet: usize, _message: &[Atom], cx: &mut Context<'_>) {
        cx.send(0, vec![Atom::bang()]);
    }
}

/// Forwards every message unchanged.
pub struct Pass;

impl Pass {
    /// Constructor for `pass`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        at_most(args, 0)?;
        Ok(Box::new(Self))
    }
}

impl Object for Pass {
    fn inlets(&self) -> &[PinKind] {
        &ONE
    }

    fn outlets(&self) -> &[PinKind] {
        &ONE
    }

    fn receive(&mut self, _inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        cx.send(0, message.to_vec());
    }
}

/// Sends its arguments on loadbang, and again on every bang.
pub struct LoadMess {
    message: Vec<Atom>,
}

impl LoadMess {
    /// Constructor for `loadmess`.
    pub fn create(args: &[Atom]) -> Result<Box<dyn Object>, ArgumentError> {
        let message = if args.is_empty() {
            vec![Atom::bang()]
        } else {
            args.to_vec()
        };
        Ok(Box::new(Self { message }))
    }
}

impl Object for LoadMess {
    fn inlets(&self) -> &[PinKind] {
        &ONE
    }

    fn outlets(&self) -> &[PinKind] {
        &ONE
    }

    fn receive(&mut self, _inlet: usize, message: &[Atom], cx: &mut Context<'_>) {
        if message.first().is_some_and(Atom::is_bang) {
            cx.send(0, self.message.clone());
        }
    }

    fn loadbang(&mut self, cx: &mut Context<'_>) {
        cx.send(0, self.message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{Console, Level};

    fn run(object: &mut dyn Object, inlet: usize, text: &str) -> Vec<(usize, Vec<Atom>)> {
        let console = Console::new();
        let mut cx = Context::new(&console);
        object.receive(inlet, &Atom::parse(text), &mut cx);
        cx.into_outputs()
    }

    #[test]
    fn plus_uses_stored_right_operand() {
        let mut plus = Operator::plus(&Atom::parse("10")).unwrap();
        assert_eq!(run(plus.as_mut(), 0, "1"), vec![(0, vec![Atom::Float(11.0)])]);
        assert!(run(plus.as_mut(), 1, "5").is_empty());
        assert_eq!(run(plus.as_mut(), 0, "bang"), vec![(0, vec![Atom::Float(6.0)])]);
    }

    #[test]
    fn times_defaults_to_zero() {
        let mut times = Operator::times(&[]).unwrap();
        assert_eq!(run(times.as_mut(), 0, "3"), vec![(0, vec![Atom::Float(0.0)])]);
    }

    #[test]
    fn operator_rejects_symbol_argument() {
        assert!(matches!(
            Operator::plus(&Atom::parse("foo")),
            Err(ArgumentError::NotANumber { index: 0, .. })
        ));
    }

    #[test]
    fn operator_warns_on_unknown_message() {
        let console = Console::new();
        let mut cx = Context::new(&console);
        let mut plus = Operator::plus(&[]).unwrap();
        plus.receive(0, &Atom::parse("hello"), &mut cx);
        assert!(cx.outputs().is_empty());
        assert_eq!(console.count(Level::Warning), 1);
    }

    #[test]
    fn print_posts_with_prefix() {
        let console = Console::new();
        let mut cx = Context::new(&console);
        let mut print = Print::create(&Atom::parse("osc")).unwrap();
        print.receive(0, &Atom::parse("1 2 three"), &mut cx);
        assert_eq!(console.messages()[0].text, "osc: 1 2 three");
        assert_eq!(console.messages()[0].level, Level::Post);
    }

    #[test]
    fn bang_and_pass() {
        let mut bang = Bang::create(&[]).unwrap();
        assert_eq!(run(bang.as_mut(), 0, "42"), vec![(0, vec![Atom::bang()])]);
        let mut pass = Pass::create(&[]).unwrap();
        assert_eq!(run(pass.as_mut(), 0, "a 1"), vec![(0, Atom::parse("a 1"))]);
    }

    #[test]
    fn loadmess_sends_on_loadbang_and_bang() {
        let console = Console::new();
        let mut loadmess = LoadMess::create(&Atom::parse("440")).unwrap();
        let mut cx = Context::new(&console);
        loadmess.loadbang(&mut cx);
        assert_eq!(cx.into_outputs(), vec![(0, vec![Atom::Int(440)])]);
        assert_eq!(run(loadmess.as_mut(), 0, "bang"), vec![(0, vec![Atom::Int(440)])]);
        assert!(run(loadmess.as_mut(), 0, "1").is_empty());
    }
}
