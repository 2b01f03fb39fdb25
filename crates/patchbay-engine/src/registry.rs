//! Object registry and factory.
//!
//! The registry maps class names to constructors. It is built once at startup
//! and passed to whoever creates objects; there is no global state.
//!
//! ```rust
//! use patchbay_engine::ObjectRegistry;
//!
//! let registry = ObjectRegistry::with_builtins();
//! let (class, object) = registry.create_from_text("+ 1").unwrap();
//! assert_eq!(class, "+");
//! assert_eq!(object.inlets().len(), 2);
//! ```

use crate::atom::Atom;
use crate::error::{ArgumentError, EngineError};
use crate::object::Object;
use crate::objects::{
    AdcTilde, Bang, DacTilde, ErrorBox, LoadMess, Operator, OperatorTilde, Pass, Print, SigTilde,
};

/// Broad grouping of object classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    /// Control messages only.
    Control,
    /// Has signal pins and runs in the DSP chain.
    Signal,
    /// Stands in for a box that failed to create.
    Placeholder,
}

impl ObjectCategory {
    /// Returns a human-readable name.
    pub const fn name(&self) -> &'static str {
        match self {
            ObjectCategory::Control => "Control",
            ObjectCategory::Signal => "Signal",
            ObjectCategory::Placeholder => "Placeholder",
        }
    }
}

/// Describes one object class.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    /// Class name as typed in a box.
    pub name: &'static str,
    /// Brief description.
    pub description: &'static str,
    /// Category.
    pub category: ObjectCategory,
}

/// Constructor of one object class.
pub type ObjectConstructor = fn(&[Atom]) -> Result<Box<dyn Object>, ArgumentError>;

struct RegistryEntry {
    descriptor: ObjectDescriptor,
    constructor: ObjectConstructor,
}

/// Every object class the engine can instantiate.
pub struct ObjectRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ObjectRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Creates a registry holding every built-in class.
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            entries: Vec::with_capacity(12),
        };
        registry.register_builtins();
        registry
    }

    fn register_builtins(&mut self) {
        // Control
        self.add(
            control("+", "Adds the right operand to numbers on the left inlet"),
            Operator::plus,
        );
        self.add(
            control("*", "Multiplies numbers on the left inlet by the right operand"),
            Operator::times,
        );
        self.add(control("print", "Posts incoming messages to the console"), Print::create);
        self.add(control("bang", "Outputs a bang for any message"), Bang::create);
        self.add(control("pass", "Forwards messages unchanged"), Pass::create);
        self.add(
            control("loadmess", "Sends its arguments when the patch loads"),
            LoadMess::create,
        );

        // Signal
        self.add(signal("sig~", "Converts a number to a constant signal"), SigTilde::create);
        self.add(signal("+~", "Adds two signals, or a signal and a number"), OperatorTilde::plus);
        self.add(
            signal("*~", "Multiplies two signals, or a signal and a number"),
            OperatorTilde::times,
        );
        self.add(signal("adc~", "Audio interface input channels"), AdcTilde::create);
        self.add(signal("dac~", "Audio interface output channels"), DacTilde::create);

        // Placeholder
        self.add(
            ObjectDescriptor {
                name: "errorbox",
                description: "Placeholder for a box that could not be created",
                category: ObjectCategory::Placeholder,
            },
            ErrorBox::create,
        );
    }

    fn add(&mut self, descriptor: ObjectDescriptor, constructor: ObjectConstructor) {
        self.entries.push(RegistryEntry {
            descriptor,
            constructor,
        });
    }

    /// Registers a class.
    pub fn register(
        &mut self,
        descriptor: ObjectDescriptor,
        constructor: ObjectConstructor,
    ) -> Result<(), EngineError> {
        if self.contains(descriptor.name) {
            return Err(EngineError::DuplicateClass(descriptor.name.to_string()));
        }
        self.add(descriptor, constructor);
        Ok(())
    }

    /// Returns every descriptor in registration order.
    pub fn all(&self) -> impl Iterator<Item = &ObjectDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    /// Returns the descriptors of one category.
    pub fn in_category(&self, category: ObjectCategory) -> Vec<&ObjectDescriptor> {
        self.all().filter(|d| d.category == category).collect()
    }

    /// Looks up a class.
    pub fn get(&self, name: &str) -> Option<&ObjectDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.name == name)
            .map(|e| &e.descriptor)
    }

    /// Returns true if the class is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Instantiates `name` with `args`.
    pub fn create(&self, name: &str, args: &[Atom]) -> Result<Box<dyn Object>, EngineError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.descriptor.name == name)
            .ok_or_else(|| EngineError::UnknownClass(name.to_string()))?;
        (entry.constructor)(args).map_err(|source| EngineError::Argument {
            class: name.to_string(),
            source,
        })
    }

    /// Parses box text and instantiates it. Returns the class name too.
    pub fn create_from_text(&self, text: &str) -> Result<(String, Box<dyn Object>), EngineError> {
        let atoms = Atom::parse(text);
        let Some((class, args)) = atoms.split_first() else {
            return Err(EngineError::EmptyText);
        };
        let class = class.to_string();
        let object = self.create(&class, args)?;
        Ok((class, object))
    }

    /// Returns the number of registered classes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no class is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn control(name: &'static str, description: &'static str) -> ObjectDescriptor {
    ObjectDescriptor {
        name,
        description,
        category: ObjectCategory::Control,
    }
}

fn signal(name: &'static str, description: &'static str) -> ObjectDescriptor {
    ObjectDescriptor {
        name,
        description,
        category: ObjectCategory::Signal,
    }
}
