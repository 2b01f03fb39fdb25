//! The engine side of a patch.
//!
//! [`Patcher`] mirrors the boxes and links of the shared document into live
//! [`Object`]s and, for the signal part of the graph, into a compiled
//! [`Chain`] running on the audio thread.
//!
//! # Mirroring
//!
//! [`Patcher::mirror()`] consumes the [`ChangeSet`] drained from the document
//! after every commit, pull, undo or redo:
//!
//! - a new box is created through the [`ObjectRegistry`]; if that fails the
//!   error goes to the console and an `errorbox` with the recorded pin counts
//!   takes its place
//! - a new link is checked against the pins of both ends; invalid links are
//!   reported and kept inactive until an edit makes them valid
//! - any change touching the signal graph marks the chain dirty; a new chain
//!   is then built, compiled and handed to the audio thread through
//!   [`ChainSwap`]
//!
//! # Control messages
//!
//! Messages travel depth-first along control links. Each link counts how many
//! times it is on the current dispatch stack; a link entered more than
//! [`STACK_LIMIT`] times means the message loops. A dispatch nested deeper
//! than [`DEPTH_LIMIT`] links is treated the same way, which bounds the
//! thread stack used by long loops. Either way propagation halts, the loop is
//! recorded and exactly one error is posted once the top-level dispatch
//! unwinds. The counters are cleared between top-level dispatches.

use std::collections::{BTreeMap, HashMap};

use patchbay_dsp::{Chain, ChainError, ChainSwap, Connection, ProcessorId};
use patchbay_sync::{Change, ChangeSet, Document, ObjectId};

use crate::atom::Atom;
use crate::audio::AudioBus;
use crate::console::Console;
use crate::error::EngineError;
use crate::object::{Context, Object, signal_index};
use crate::objects::ErrorBox;
use crate::patch::{LINK_CLASS, LinkSpec, OBJECT_CLASS, ObjectSpec};
use crate::registry::ObjectRegistry;

/// Times a single link may be re-entered during one dispatch.
pub const STACK_LIMIT: usize = 64;

/// Links a single dispatch may nest through before it is halted.
pub const DEPTH_LIMIT: usize = 256;

/// Sample rate and block length used to compile chains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSettings {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Samples per block.
    pub vector_size: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            vector_size: 64,
        }
    }
}

struct Node {
    class: String,
    text: String,
    object: Box<dyn Object>,
}

#[derive(Debug, Clone, Copy)]
struct Wire {
    spec: LinkSpec,
    active: bool,
    signal: bool,
}

/// Live objects and links of one patch.
pub struct Patcher {
    nodes: BTreeMap<ObjectId, Node>,
    wires: BTreeMap<ObjectId, Wire>,
    console: Console,
    bus: AudioBus,
    swap: ChainSwap,
    settings: AudioSettings,
    dirty: bool,
    stacks: HashMap<ObjectId, usize>,
    path: Vec<ObjectId>,
    overflow: Option<Vec<ObjectId>>,
    overflows: Vec<Vec<ObjectId>>,
}

impl Patcher {
    /// Creates an empty patcher installing its chains through `swap`.
    pub fn new(console: Console, bus: AudioBus, swap: ChainSwap, settings: AudioSettings) -> Self {
        Self {
            nodes: BTreeMap::new(),
            wires: BTreeMap::new(),
            console,
            bus,
            swap,
            settings,
            dirty: false,
            stacks: HashMap::new(),
            path: Vec::new(),
            overflow: None,
            overflows: Vec::new(),
        }
    }

    // --- Accessors ---

    /// Returns the console.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Returns the audio bus.
    pub fn bus(&self) -> &AudioBus {
        &self.bus
    }

    /// Returns the settings chains are compiled with.
    pub fn settings(&self) -> AudioSettings {
        self.settings
    }

    /// Returns the number of live objects.
    pub fn object_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of links, active or not.
    pub fn link_count(&self) -> usize {
        self.wires.len()
    }

    /// Returns the number of links currently carrying messages or signals.
    pub fn active_link_count(&self) -> usize {
        self.wires.values().filter(|w| w.active).count()
    }

    /// Returns true if the link exists and is active.
    pub fn is_link_active(&self, id: ObjectId) -> bool {
        self.wires.get(&id).is_some_and(|w| w.active)
    }

    /// Returns the class an object was created as (`errorbox` on failure).
    pub fn class_of(&self, id: ObjectId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.class.as_str())
    }

    /// Returns a live object.
    pub fn object(&self, id: ObjectId) -> Option<&dyn Object> {
        self.nodes.get(&id).map(|n| n.object.as_ref())
    }

    /// Iterates over `(id, class, text)` of every object in id order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &str, &str)> {
        self.nodes
            .iter()
            .map(|(id, n)| (*id, n.class.as_str(), n.text.as_str()))
    }

    /// Iterates over `(id, link, active)` of every link in id order.
    pub fn links(&self) -> impl Iterator<Item = (ObjectId, LinkSpec, bool)> + '_ {
        self.wires.iter().map(|(id, w)| (*id, w.spec, w.active))
    }

    /// Returns how many chains have been installed so far.
    pub fn chain_generation(&self) -> u64 {
        self.swap.installed()
    }

    /// Returns every message loop detected so far, as the links involved.
    pub fn stack_overflows(&self) -> &[Vec<ObjectId>] {
        &self.overflows
    }

    /// Forgets the recorded message loops.
    pub fn clear_stack_overflows(&mut self) {
        self.overflows.clear();
    }

    // --- Mirroring ---

    /// Applies document changes to the live patch.
    ///
    /// Rebuilds and installs the DSP chain if the signal graph changed.
    pub fn mirror(
        &mut self,
        changes: ChangeSet,
        document: &Document,
        registry: &ObjectRegistry,
    ) -> Result<(), EngineError> {
        for change in changes {
            match change {
                Change::Added { id, class } if class == OBJECT_CLASS => {
                    self.object_added(id, document, registry);
                }
                Change::Added { id, class } if class == LINK_CLASS => {
                    self.link_added(id, document);
                }
                Change::Added { .. } => {}
                Change::Changed { id, field } => {
                    if self.nodes.contains_key(&id) {
                        if field == "text" {
                            self.object_changed(id, document, registry);
                        }
                    } else if self.wires.contains_key(&id) {
                        self.link_changed(id, document);
                    }
                }
                Change::Removed { id, .. } => {
                    if self.nodes.contains_key(&id) {
                        self.object_removed(id);
                    } else if self.wires.contains_key(&id) {
                        self.link_removed(id);
                    }
                }
            }
        }
        self.swap.collect_retired();
        if self.dirty {
            self.rebuild()?;
        }
        Ok(())
    }

    fn instantiate(&self, spec: &ObjectSpec, registry: &ObjectRegistry) -> Node {
        match registry.create_from_text(&spec.text) {
            Ok((class, object)) => Node {
                class,
                text: spec.text.clone(),
                object,
            },
            Err(err) => {
                self.console.error(err.to_string());
                Node {
                    class: "errorbox".to_string(),
                    text: spec.text.clone(),
                    object: Box::new(ErrorBox::with_pins(spec.inlets, spec.outlets)),
                }
            }
        }
    }

    fn object_added(&mut self, id: ObjectId, document: &Document, registry: &ObjectRegistry) {
        let Some(spec) = document.get(id).and_then(ObjectSpec::from_record) else {
            return;
        };
        let node = self.instantiate(&spec, registry);
        tracing::debug!(%id, class = %node.class, "object added");
        self.dirty |= node.object.is_dsp();
        self.nodes.insert(id, node);
        self.revalidate_links(id);
    }

    fn object_changed(&mut self, id: ObjectId, document: &Document, registry: &ObjectRegistry) {
        let Some(spec) = document.get(id).and_then(ObjectSpec::from_record) else {
            return;
        };
        if self.nodes.get(&id).is_some_and(|n| n.text == spec.text) {
            return;
        }
        let node = self.instantiate(&spec, registry);
        tracing::debug!(%id, class = %node.class, "object replaced");
        self.dirty |= node.object.is_dsp();
        if let Some(old) = self.nodes.insert(id, node) {
            self.dirty |= old.object.is_dsp();
        }
        self.revalidate_links(id);
    }

    fn object_removed(&mut self, id: ObjectId) {
        if let Some(old) = self.nodes.remove(&id) {
            tracing::debug!(%id, class = %old.class, "object removed");
            self.dirty |= old.object.is_dsp();
        }
        for wire in self.wires.values_mut().filter(|w| w.spec.touches(id)) {
            wire.active = false;
        }
    }

    fn link_added(&mut self, id: ObjectId, document: &Document) {
        let Some(spec) = document.get(id).and_then(LinkSpec::from_record) else {
            self.console.warning(format!("link {id}: incomplete record ignored"));
            return;
        };
        let mut wire = Wire {
            spec,
            active: false,
            signal: false,
        };
        match self.check(&spec) {
            Ok(signal) => {
                wire.active = true;
                wire.signal = signal;
                self.dirty |= signal;
            }
            Err(message) => self.console.error(message),
        }
        self.wires.insert(id, wire);
    }

    fn link_changed(&mut self, id: ObjectId, document: &Document) {
        let Some(before) = self.wires.get(&id).copied() else {
            return;
        };
        let after = match document.get(id).and_then(LinkSpec::from_record) {
            Some(spec) => match self.check(&spec) {
                Ok(signal) => Wire {
                    spec,
                    active: true,
                    signal,
                },
                Err(message) => {
                    self.console.error(message);
                    Wire {
                        spec,
                        active: false,
                        signal: false,
                    }
                }
            },
            None => Wire {
                active: false,
                ..before
            },
        };
        self.dirty |= (before.active && before.signal) || (after.active && after.signal);
        self.wires.insert(id, after);
    }

    fn link_removed(&mut self, id: ObjectId) {
        if let Some(wire) = self.wires.remove(&id) {
            self.dirty |= wire.active && wire.signal;
        }
    }

    /// Re-checks the links touching `id` after the object was (re)created.
    fn revalidate_links(&mut self, id: ObjectId) {
        let touching: Vec<ObjectId> = self
            .wires
            .iter()
            .filter(|(_, w)| w.spec.touches(id))
            .map(|(link, _)| *link)
            .collect();
        for link in touching {
            let Some(wire) = self.wires.get(&link).copied() else {
                continue;
            };
            let (active, signal) = match self.check(&wire.spec) {
                Ok(signal) => (true, signal),
                Err(message) => {
                    if wire.active {
                        self.console.warning(message);
                    }
                    (false, false)
                }
            };
            self.dirty |= (wire.active && wire.signal) || (active && signal);
            self.wires.insert(
                link,
                Wire {
                    active,
                    signal,
                    ..wire
                },
            );
        }
    }

    /// Returns whether the link carries a signal, or why it is invalid.
    fn check(&self, spec: &LinkSpec) -> Result<bool, String> {
        let from = self
            .nodes
            .get(&spec.from)
            .ok_or_else(|| format!("link {spec}: sending box not found"))?;
        let to = self
            .nodes
            .get(&spec.to)
            .ok_or_else(|| format!("link {spec}: receiving box not found"))?;
        let outlet = from.object.outlets().get(spec.outlet).copied().ok_or_else(|| {
            format!("link {spec}: {} has no outlet {}", from.class, spec.outlet + 1)
        })?;
        let inlet = to.object.inlets().get(spec.inlet).copied().ok_or_else(|| {
            format!("link {spec}: {} has no inlet {}", to.class, spec.inlet + 1)
        })?;
        if outlet.is_signal() && !inlet.is_signal() {
            return Err(format!(
                "link {spec}: cannot connect a signal outlet to a control inlet"
            ));
        }
        Ok(outlet.is_signal())
    }

    // --- DSP ---

    /// Builds, compiles and installs a chain from the current signal graph.
    ///
    /// Processors are added in object id order and connections in link id
    /// order, so every peer compiles the same schedule for the same patch.
    pub fn rebuild(&mut self) -> Result<(), EngineError> {
        self.dirty = false;
        let mut chain = Chain::new();
        let mut slots: HashMap<ObjectId, ProcessorId> = HashMap::new();
        for (id, node) in &self.nodes {
            if let Some(processor) = node.object.processor(&self.bus) {
                slots.insert(*id, chain.add_processor(processor)?);
            }
        }

        for wire in self.wires.values().filter(|w| w.active && w.signal) {
            let spec = wire.spec;
            let (Some(&source), Some(&dest)) = (slots.get(&spec.from), slots.get(&spec.to)) else {
                continue;
            };
            let (Some(from), Some(to)) = (self.nodes.get(&spec.from), self.nodes.get(&spec.to))
            else {
                continue;
            };
            let (Some(outlet), Some(inlet)) = (
                signal_index(from.object.outlets(), spec.outlet),
                signal_index(to.object.inlets(), spec.inlet),
            ) else {
                continue;
            };
            match chain.add_connection(Connection::new(source, outlet, dest, inlet)) {
                Ok(_) => {}
                Err(ChainError::DuplicateConnection(_)) => {
                    tracing::debug!(link = %spec, "duplicate signal link skipped");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let report = chain.compile(self.settings.sample_rate, self.settings.vector_size)?;
        for (processor, err) in &report.failed {
            let class = slots
                .iter()
                .find(|(_, p)| *p == processor)
                .and_then(|(id, _)| self.nodes.get(id))
                .map_or("processor", |n| n.class.as_str());
            self.console.error(format!("{class}: {err}"));
        }
        tracing::info!(
            processors = chain.processor_count(),
            connections = chain.connection_count(),
            delayed = report.delayed.len(),
            "dsp chain rebuilt"
        );
        self.swap.install(chain)?;
        Ok(())
    }

    // --- Control messages ---

    /// Sends `message` to `inlet` of object `id` and routes what follows.
    pub fn send(&mut self, id: ObjectId, inlet: usize, message: &[Atom]) -> Result<(), EngineError> {
        let node = self.nodes.get(&id).ok_or(EngineError::ObjectNotFound(id))?;
        let count = node.object.inlets().len();
        if inlet >= count {
            return Err(EngineError::InletOutOfRange { id, inlet, count });
        }
        self.deliver(id, inlet, message);
        self.end_dispatch();
        Ok(())
    }

    /// Calls `loadbang` on every object, in id order.
    pub fn send_loadbang(&mut self) {
        let ids: Vec<ObjectId> = self.nodes.keys().copied().collect();
        for id in ids {
            let outputs = {
                let Some(node) = self.nodes.get_mut(&id) else {
                    continue;
                };
                let mut cx = Context::with_audio(&self.console, &self.bus);
                node.object.loadbang(&mut cx);
                cx.into_outputs()
            };
            self.emit(id, outputs);
            self.end_dispatch();
        }
    }

    fn deliver(&mut self, id: ObjectId, inlet: usize, message: &[Atom]) {
        let outputs = {
            let Some(node) = self.nodes.get_mut(&id) else {
                return;
            };
            let mut cx = Context::with_audio(&self.console, &self.bus);
            node.object.receive(inlet, message, &mut cx);
            cx.into_outputs()
        };
        self.emit(id, outputs);
    }

    fn emit(&mut self, from: ObjectId, outputs: Vec<(usize, Vec<Atom>)>) {
        for (outlet, message) in outputs {
            let targets: Vec<(ObjectId, ObjectId, usize)> = self
                .wires
                .iter()
                .filter(|(_, w)| {
                    w.active && !w.signal && w.spec.from == from && w.spec.outlet == outlet
                })
                .map(|(link, w)| (*link, w.spec.to, w.spec.inlet))
                .collect();
            for (link, to, inlet) in targets {
                if self.overflow.is_some() {
                    return;
                }
                if self.path.len() >= DEPTH_LIMIT {
                    self.record_overflow(link);
                    return;
                }
                let depth = self.stacks.entry(link).or_insert(0);
                *depth += 1;
                if *depth > STACK_LIMIT {
                    self.record_overflow(link);
                    return;
                }
                self.path.push(link);
                self.deliver(to, inlet, &message);
                self.path.pop();
                if let Some(depth) = self.stacks.get_mut(&link) {
                    *depth -= 1;
                }
            }
        }
    }

    /// Keeps the links on the current stack, each once, in entry order.
    fn record_overflow(&mut self, link: ObjectId) {
        let mut path: Vec<ObjectId> = Vec::new();
        for id in self.path.iter().copied().chain([link]) {
            if !path.contains(&id) {
                path.push(id);
            }
        }
        self.overflow = Some(path);
    }

    fn end_dispatch(&mut self) {
        if let Some(path) = self.overflow.take() {
            tracing::warn!(links = path.len(), "control message loop halted");
            self.console.error(format!(
                "stack overflow: message loop through {} link(s) stopped",
                path.len()
            ));
            self.overflows.push(path);
        }
        self.stacks.clear();
        self.path.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Level;
    use crate::patch::{LinkSpec, ObjectSpec};
    use patchbay_dsp::{AudioRunner, chain_swap};
    use patchbay_sync::{ActorId, Document};

    struct Fixture {
        doc: Document,
        patcher: Patcher,
        registry: ObjectRegistry,
        runner: AudioRunner,
    }

    impl Fixture {
        fn new() -> Self {
            let (swap, runner) = chain_swap(4);
            let settings = AudioSettings {
                sample_rate: 48_000.0,
                vector_size: 8,
            };
            Self {
                doc: Document::new(ActorId::random()),
                patcher: Patcher::new(Console::new(), AudioBus::new(2, 2, 8), swap, settings),
                registry: ObjectRegistry::with_builtins(),
                runner,
            }
        }

        fn add(&mut self, text: &str) -> ObjectId {
            let (inlets, outlets) = self
                .registry
                .create_from_text(text)
                .map(|(_, o)| (o.inlets().len(), o.outlets().len()))
                .unwrap_or((0, 0));
            let spec = ObjectSpec {
                text: text.to_string(),
                inlets,
                outlets,
                x: 0.0,
                y: 0.0,
            };
            let id = self.doc.insert(OBJECT_CLASS, spec.fields());
            self.sync();
            id
        }

        fn link(&mut self, from: ObjectId, outlet: usize, to: ObjectId, inlet: usize) -> ObjectId {
            let spec = LinkSpec {
                from,
                outlet,
                to,
                inlet,
            };
            let id = self.doc.insert(LINK_CLASS, spec.fields());
            self.sync();
            id
        }

        fn sync(&mut self) {
            let changes = self.doc.take_changes();
            self.patcher
                .mirror(changes, &self.doc, &self.registry)
                .unwrap();
        }

        fn console(&self) -> &Console {
            self.patcher.console()
        }
    }

    #[test]
    fn unknown_class_becomes_errorbox() {
        let mut f = Fixture::new();
        let id = f.add("osc~ 440");
        assert_eq!(f.patcher.class_of(id), Some("errorbox"));
        assert_eq!(f.console().count(Level::Error), 1);
        assert_eq!(f.console().messages()[0].text, "osc~: no such object");
    }

    #[test]
    fn bad_arguments_become_errorbox() {
        let mut f = Fixture::new();
        let id = f.add("adc~ 0:2");
        assert_eq!(f.patcher.class_of(id), Some("errorbox"));
        assert!(
            f.console().messages()[0]
                .text
                .contains("audio interface null or negative channel")
        );
    }

    #[test]
    fn out_of_range_link_is_rejected() {
        let mut f = Fixture::new();
        let a = f.add("bang");
        let b = f.add("print");
        let link = f.link(a, 3, b, 0);
        assert!(!f.patcher.is_link_active(link));
        assert_eq!(f.patcher.link_count(), 1);
        assert_eq!(f.patcher.active_link_count(), 0);
        assert_eq!(f.console().count(Level::Error), 1);
    }

    #[test]
    fn signal_outlet_into_control_inlet_is_rejected() {
        let mut f = Fixture::new();
        let sig = f.add("sig~ 1");
        let print = f.add("print");
        let link = f.link(sig, 0, print, 0);
        assert!(!f.patcher.is_link_active(link));
    }

    #[test]
    fn messages_follow_links() {
        let mut f = Fixture::new();
        let plus = f.add("+ 1");
        let print = f.add("print result");
        f.link(plus, 0, print, 0);
        f.patcher.send(plus, 0, &[Atom::Int(41)]).unwrap();
        assert_eq!(f.console().messages().last().unwrap().text, "result: 42");
    }

    #[test]
    fn send_checks_target() {
        let mut f = Fixture::new();
        let print = f.add("print");
        assert!(matches!(
            f.patcher.send(print, 1, &[Atom::bang()]),
            Err(EngineError::InletOutOfRange { inlet: 1, count: 1, .. })
        ));
    }

    #[test]
    fn control_loop_posts_one_error() {
        let mut f = Fixture::new();
        let a = f.add("pass");
        let b = f.add("pass");
        let ab = f.link(a, 0, b, 0);
        let ba = f.link(b, 0, a, 0);
        f.patcher.send(a, 0, &[Atom::bang()]).unwrap();

        assert_eq!(f.console().count(Level::Error), 1);
        assert_eq!(f.patcher.stack_overflows().len(), 1);
        let path = &f.patcher.stack_overflows()[0];
        assert!(path.contains(&ab) && path.contains(&ba));

        // Counters are cleared: the next dispatch detects the loop again.
        f.patcher.send(b, 0, &[Atom::bang()]).unwrap();
        assert_eq!(f.console().count(Level::Error), 2);
    }

    #[test]
    fn loadbang_reaches_linked_objects() {
        let mut f = Fixture::new();
        let load = f.add("loadmess hello");
        let print = f.add("print");
        f.link(load, 0, print, 0);
        f.patcher.send_loadbang();
        assert_eq!(f.console().messages().last().unwrap().text, "print: hello");
    }

    #[test]
    fn signal_edits_install_new_chains() {
        let mut f = Fixture::new();
        assert_eq!(f.patcher.chain_generation(), 0);
        let sig = f.add("sig~ 0.5");
        assert_eq!(f.patcher.chain_generation(), 1);
        let dac = f.add("dac~ 1");
        f.link(sig, 0, dac, 0);
        assert_eq!(f.patcher.chain_generation(), 3);

        f.add("print");
        assert_eq!(f.patcher.chain_generation(), 3);

        f.runner.process_block();
        let out = f.patcher.bus().take_outputs();
        assert_eq!(out[0].as_slice(), &[0.5; 8]);
    }

    #[test]
    fn removing_a_box_deactivates_its_links() {
        let mut f = Fixture::new();
        let a = f.add("bang");
        let b = f.add("print");
        let link = f.link(a, 0, b, 0);
        f.doc.erase(b).unwrap();
        f.sync();
        assert!(!f.patcher.is_link_active(link));
        assert_eq!(f.patcher.object_count(), 1);
    }

    #[test]
    fn retyping_a_box_rechecks_links() {
        let mut f = Fixture::new();
        let a = f.add("bang");
        let b = f.add("+");
        let link = f.link(a, 0, b, 1);
        assert!(f.patcher.is_link_active(link));

        f.doc.set(b, "text", "print").unwrap();
        f.sync();
        assert_eq!(f.patcher.class_of(b), Some("print"));
        assert!(!f.patcher.is_link_active(link));

        f.doc.set(b, "text", "* 2").unwrap();
        f.sync();
        assert!(f.patcher.is_link_active(link));
    }
}
