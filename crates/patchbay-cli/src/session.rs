//! A terminal editing session on top of an [`Instance`].

use std::io::Write;

use patchbay_engine::{Atom, Instance, LINK_CLASS};
use patchbay_sync::{Carrier, ObjectId};

use crate::repl::{Command, HELP};

/// Vertical spacing of boxes added from the terminal.
const ROW_HEIGHT: f64 = 30.0;

/// What the caller should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Stable `#n` handles for document ids, assigned on first sight.
#[derive(Debug, Default)]
struct Handles {
    ids: Vec<ObjectId>,
}

impl Handles {
    fn of(&mut self, id: ObjectId) -> usize {
        match self.ids.iter().position(|known| *known == id) {
            Some(index) => index + 1,
            None => {
                self.ids.push(id);
                self.ids.len()
            }
        }
    }

    fn resolve(&self, handle: usize) -> anyhow::Result<ObjectId> {
        handle
            .checked_sub(1)
            .and_then(|index| self.ids.get(index))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no such handle #{handle} (try 'list')"))
    }
}

/// Runs parsed commands against an instance and prints the results.
pub struct Session<C: Carrier> {
    instance: Instance<C>,
    handles: Handles,
}

impl<C: Carrier> Session<C> {
    pub fn new(instance: Instance<C>) -> Self {
        Self {
            instance,
            handles: Handles::default(),
        }
    }

    pub fn instance(&self) -> &Instance<C> {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut Instance<C> {
        &mut self.instance
    }

    /// Executes one command, writing its output to `out`.
    pub fn execute(&mut self, command: Command, out: &mut impl Write) -> anyhow::Result<Flow> {
        match command {
            Command::Add(text) => {
                let y = self.instance.patcher().object_count() as f64 * ROW_HEIGHT;
                let id = self.instance.add_object(&text, 0.0, y)?;
                writeln!(out, "#{} {}", self.handles.of(id), text)?;
            }
            Command::Link {
                from,
                outlet,
                to,
                inlet,
            } => {
                let (from, to) = (self.handles.resolve(from)?, self.handles.resolve(to)?);
                let id = self.instance.add_link(from, outlet, to, inlet)?;
                let state = if self.instance.patcher().is_link_active(id) {
                    ""
                } else {
                    " (inactive)"
                };
                let handle = self.handles.of(id);
                let line = self.describe_link(from, outlet, to, inlet);
                writeln!(out, "#{handle} {line}{state}")?;
            }
            Command::Remove(handle) => {
                let id = self.handles.resolve(handle)?;
                let is_link = self
                    .instance
                    .manager()
                    .document()
                    .get(id)
                    .is_some_and(|r| r.class() == LINK_CLASS);
                if is_link {
                    self.instance.remove_link(id)?;
                } else {
                    self.instance.remove_object(id)?;
                }
            }
            Command::Edit(handle, text) => {
                let id = self.handles.resolve(handle)?;
                self.instance.set_text(id, &text)?;
            }
            Command::Move(handle, x, y) => {
                let id = self.handles.resolve(handle)?;
                self.instance.move_object(id, [(x, y)])?;
            }
            Command::Send {
                target,
                inlet,
                message,
            } => {
                let id = self.handles.resolve(target)?;
                self.instance.send(id, inlet, &message)?;
            }
            Command::Bang(handle) => {
                let id = self.handles.resolve(handle)?;
                self.instance.send(id, 0, &[Atom::bang()])?;
            }
            Command::Loadbang => self.instance.send_loadbang(),
            Command::Undo => {
                if !self.instance.undo()? {
                    writeln!(out, "nothing to undo")?;
                }
            }
            Command::Redo => {
                if !self.instance.redo()? {
                    writeln!(out, "nothing to redo")?;
                }
            }
            Command::List => self.list(out)?,
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Prints and drains the console.
    pub fn flush_console(&self, out: &mut impl Write) -> std::io::Result<()> {
        for message in self.instance.console().take() {
            writeln!(out, "{}: {}", message.level, message.text)?;
        }
        Ok(())
    }

    fn list(&mut self, out: &mut impl Write) -> anyhow::Result<()> {
        let patcher = self.instance.patcher();
        let objects: Vec<(ObjectId, String, String)> = patcher
            .objects()
            .map(|(id, class, text)| (id, class.to_string(), text.to_string()))
            .collect();
        let links: Vec<_> = patcher.links().collect();

        if objects.is_empty() {
            writeln!(out, "(empty patch)")?;
        }
        for (id, class, text) in objects {
            let marker = if class == "errorbox" { " (errorbox)" } else { "" };
            writeln!(out, "#{} {}{}", self.handles.of(id), text, marker)?;
        }
        for (id, spec, active) in links {
            let handle = self.handles.of(id);
            let line = self.describe_link(spec.from, spec.outlet, spec.to, spec.inlet);
            let state = if active { "" } else { " (inactive)" };
            writeln!(out, "#{handle} {line}{state}")?;
        }
        Ok(())
    }

    fn describe_link(&mut self, from: ObjectId, outlet: usize, to: ObjectId, inlet: usize) -> String {
        format!(
            "#{} outlet {} -> #{} inlet {}",
            self.handles.of(from),
            outlet + 1,
            self.handles.of(to),
            inlet + 1
        )
    }
}
