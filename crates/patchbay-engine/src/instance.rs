//! One running patch: document, engine and console together.
//!
//! [`Instance`] is what a front end drives. Edits go through the
//! [`DocumentManager`] as commits or gestures, and every commit, pull, undo or
//! redo is mirrored into the [`Patcher`] right away, so the live objects and
//! the DSP chain always match the document.

use std::time::Instant;

use patchbay_dsp::{AudioRunner, chain_swap};
use patchbay_sync::{Carrier, DocumentManager, ManagerEvent, ObjectId, SyncError, Value};

use crate::atom::Atom;
use crate::audio::AudioBus;
use crate::console::Console;
use crate::error::EngineError;
use crate::patch::{LINK_CLASS, LinkSpec, OBJECT_CLASS, ObjectSpec};
use crate::patcher::{AudioSettings, Patcher};
use crate::registry::ObjectRegistry;

/// Chains that may wait for the audio thread at once.
const SWAP_CAPACITY: usize = 4;

/// Hardware channel counts of the audio bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channels {
    /// Input channels.
    pub inputs: usize,
    /// Output channels.
    pub outputs: usize,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
        }
    }
}

/// A patch being edited and played.
pub struct Instance<C: Carrier> {
    registry: ObjectRegistry,
    console: Console,
    manager: DocumentManager<C>,
    patcher: Patcher,
}

impl<C: Carrier> Instance<C> {
    /// Creates an instance and the audio-thread endpoint playing it.
    pub fn new(
        registry: ObjectRegistry,
        manager: DocumentManager<C>,
        settings: AudioSettings,
        channels: Channels,
    ) -> (Self, AudioRunner) {
        let console = Console::new();
        let bus = AudioBus::new(channels.inputs, channels.outputs, settings.vector_size);
        let (swap, runner) = chain_swap(SWAP_CAPACITY);
        let patcher = Patcher::new(console.clone(), bus, swap, settings);
        (
            Self {
                registry,
                console,
                manager,
                patcher,
            },
            runner,
        )
    }

    // --- Accessors ---

    /// Returns the object registry.
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Returns the console.
    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Returns the audio bus.
    pub fn bus(&self) -> &AudioBus {
        self.patcher.bus()
    }

    /// Returns the document manager.
    pub fn manager(&self) -> &DocumentManager<C> {
        &self.manager
    }

    /// Returns the document manager mutably.
    ///
    /// Edits made through it are mirrored on the next [`tick()`](Self::tick).
    pub fn manager_mut(&mut self) -> &mut DocumentManager<C> {
        &mut self.manager
    }

    /// Returns the engine patcher.
    pub fn patcher(&self) -> &Patcher {
        &self.patcher
    }

    // --- Connection ---

    /// Connects to `session` on the relay at `host:port`.
    pub fn connect(&mut self, host: &str, port: u16, session: &str) -> Result<(), EngineError> {
        self.manager.connect(host, port, session)?;
        Ok(())
    }

    /// Closes the connection.
    pub fn disconnect(&mut self) -> Result<(), EngineError> {
        self.manager.disconnect();
        let events = self.manager.take_events();
        self.report(events);
        self.mirror()
    }

    /// Runs one main-thread step: pull, push and mirror.
    pub fn tick(&mut self) -> Result<Vec<ManagerEvent>, EngineError> {
        self.tick_at(Instant::now())
    }

    /// [`tick()`](Self::tick) with an explicit clock.
    pub fn tick_at(&mut self, now: Instant) -> Result<Vec<ManagerEvent>, EngineError> {
        let events = self.manager.tick_at(now);
        let events = self.report(events);
        self.mirror()?;
        Ok(events)
    }

    fn report(&self, events: Vec<ManagerEvent>) -> Vec<ManagerEvent> {
        for event in &events {
            match event {
                ManagerEvent::Connected => self.console.log("connected"),
                ManagerEvent::Loaded { transactions } => {
                    self.console
                        .log(format!("document loaded ({transactions} transactions)"));
                }
                ManagerEvent::Disconnected { error: Some(err) } => {
                    self.console.error(format!("disconnected: {err}"));
                }
                ManagerEvent::Disconnected { error: None } => self.console.log("disconnected"),
                ManagerEvent::Rejected { message } => {
                    self.console.error(format!("relay rejected a request: {message}"));
                }
                ManagerEvent::RemoteApplied { conflicts, .. } if *conflicts > 0 => {
                    self.console
                        .warning(format!("remote edit skipped {conflicts} operation(s)"));
                }
                _ => {}
            }
        }
        events
    }

    fn mirror(&mut self) -> Result<(), EngineError> {
        let changes = self.manager.document_mut().take_changes();
        if changes.is_empty() {
            return Ok(());
        }
        self.patcher
            .mirror(changes, self.manager.document(), &self.registry)
    }

    // --- Edits ---

    /// Adds a box and returns its id.
    ///
    /// Text that does not create an object still adds the box; the engine
    /// shows it as an `errorbox`.
    pub fn add_object(&mut self, text: &str, x: f64, y: f64) -> Result<ObjectId, EngineError> {
        self.ensure_idle()?;
        let (inlets, outlets) = self
            .registry
            .create_from_text(text)
            .map(|(_, o)| (o.inlets().len(), o.outlets().len()))
            .unwrap_or((0, 0));
        let spec = ObjectSpec {
            text: text.trim().to_string(),
            inlets,
            outlets,
            x,
            y,
        };
        let id = self
            .manager
            .document_mut()
            .insert(OBJECT_CLASS, spec.fields());
        self.manager.commit("Add object")?;
        self.mirror()?;
        Ok(id)
    }

    /// Replaces the text of a box.
    pub fn set_text(&mut self, id: ObjectId, text: &str) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.ensure_object(id)?;
        let pins = self
            .registry
            .create_from_text(text)
            .map(|(_, o)| (o.inlets().len(), o.outlets().len()))
            .ok();
        let document = self.manager.document_mut();
        document.set(id, "text", text.trim())?;
        if let Some((inlets, outlets)) = pins {
            document.set(id, "inlets", Value::Int(inlets as i64))?;
            document.set(id, "outlets", Value::Int(outlets as i64))?;
        }
        self.manager.commit("Edit object")?;
        self.mirror()
    }

    /// Links `outlet` of `from` to `inlet` of `to` and returns the link id.
    pub fn add_link(
        &mut self,
        from: ObjectId,
        outlet: usize,
        to: ObjectId,
        inlet: usize,
    ) -> Result<ObjectId, EngineError> {
        self.ensure_idle()?;
        self.ensure_object(from)?;
        self.ensure_object(to)?;
        let spec = LinkSpec {
            from,
            outlet,
            to,
            inlet,
        };
        let id = self
            .manager
            .document_mut()
            .insert(LINK_CLASS, spec.fields());
        self.manager.commit("Add link")?;
        self.mirror()?;
        Ok(id)
    }

    /// Removes a box and every link attached to it.
    pub fn remove_object(&mut self, id: ObjectId) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.ensure_object(id)?;
        let attached: Vec<ObjectId> = self
            .manager
            .document()
            .records_of(LINK_CLASS)
            .filter(|(_, r)| LinkSpec::from_record(r).is_some_and(|l| l.touches(id)))
            .map(|(link, _)| link)
            .collect();
        let document = self.manager.document_mut();
        for link in attached {
            document.erase(link)?;
        }
        document.erase(id)?;
        self.manager.commit("Remove object")?;
        self.mirror()
    }

    /// Removes a link.
    pub fn remove_link(&mut self, id: ObjectId) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let is_link = self
            .manager
            .document()
            .get(id)
            .is_some_and(|r| r.class() == LINK_CLASS);
        if !is_link {
            return Err(EngineError::ObjectNotFound(id));
        }
        self.manager.document_mut().erase(id)?;
        self.manager.commit("Remove link")?;
        self.mirror()
    }

    /// Moves a box along `path`, undoable in one step.
    ///
    /// Each step is committed to the open gesture so observers see the box
    /// move; the whole drag becomes a single transaction.
    pub fn move_object(
        &mut self,
        id: ObjectId,
        path: impl IntoIterator<Item = (f64, f64)>,
    ) -> Result<(), EngineError> {
        self.ensure_object(id)?;
        self.manager.start_gesture("Move object")?;
        for (x, y) in path {
            let step = {
                let document = self.manager.document_mut();
                document
                    .set(id, "x", x)
                    .and_then(|()| document.set(id, "y", y))
            };
            if let Err(err) = step {
                self.manager.cancel_gesture()?;
                return Err(err.into());
            }
            self.manager.commit_gesture("Move object")?;
            self.mirror()?;
        }
        self.manager.end_gesture()?;
        self.mirror()
    }

    /// Undoes the last local edit.
    pub fn undo(&mut self) -> Result<bool, EngineError> {
        let done = self.manager.undo()?.is_some();
        self.mirror()?;
        Ok(done)
    }

    /// Redoes the last undone edit.
    pub fn redo(&mut self) -> Result<bool, EngineError> {
        let done = self.manager.redo()?.is_some();
        self.mirror()?;
        Ok(done)
    }

    // --- Messages ---

    /// Sends a control message to an inlet.
    pub fn send(&mut self, id: ObjectId, inlet: usize, message: &[Atom]) -> Result<(), EngineError> {
        self.patcher.send(id, inlet, message)
    }

    /// Calls `loadbang` on every object.
    pub fn send_loadbang(&mut self) {
        self.patcher.send_loadbang();
    }

    fn ensure_idle(&self) -> Result<(), EngineError> {
        if self.manager.is_gesture_open() {
            return Err(SyncError::InvalidState("edit while a gesture is open").into());
        }
        Ok(())
    }

    fn ensure_object(&self, id: ObjectId) -> Result<(), EngineError> {
        let is_object = self
            .manager
            .document()
            .get(id)
            .is_some_and(|r| r.class() == OBJECT_CLASS);
        if is_object {
            Ok(())
        } else {
            Err(EngineError::ObjectNotFound(id))
        }
    }
}
