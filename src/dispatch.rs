// Copyright 2024 The Skhd Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The event hot path: one lookup per keystroke.
//!
//! Every keyboard event the tap delivers flows through [`Dispatcher::dispatch`],
//! which resolves the foreground process, probes the current mode's hotkey
//! map, and decides whether the event is passed, suppressed, or replaced by
//! a synthesized one. The dispatcher holds the [`Mappings`] it was given
//! until a reload installs a fresh one between events.

use std::collections::HashSet;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::exec::CommandRunner;
use crate::hotkey::{Action, HotkeyFlags};
use crate::keyboard::{EventKind, KeyEvent, KeyPress, ModifierSet};
use crate::keycodes;
use crate::mappings::{Mappings, DEFAULT_MODE};
use crate::synth::Synthesizer;

/// What the tap should do with the original event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Return the event to the window server unchanged.
    Pass,
    /// Swallow the event.
    Suppress,
    /// Swallow the event; a synthesized replacement was posted.
    Replace(KeyPress),
}

/// Counters for the hot path's early exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub self_generated_exits: u64,
    pub no_mode_exits: u64,
    pub blacklisted_exits: u64,
}

pub struct Dispatcher {
    mappings: Rc<Mappings>,
    current_mode: Option<String>,
    /// Keys whose key-down was suppressed; their key-up is swallowed too
    /// so applications never see an orphan release. Media keycodes overlap
    /// normal ones, so the NX bit is part of the key.
    pressed: HashSet<(u32, bool)>,
    /// Lower-cased name of the frontmost process, written by the platform
    /// notification callback.
    front_app: Arc<Mutex<String>>,
    runner: Box<dyn CommandRunner>,
    synth: Box<dyn Synthesizer>,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(runner: Box<dyn CommandRunner>, synth: Box<dyn Synthesizer>) -> Dispatcher {
        Dispatcher {
            mappings: Rc::new(Mappings::new()),
            current_mode: None,
            pressed: HashSet::new(),
            front_app: Arc::new(Mutex::new(String::new())),
            runner,
            synth,
            stats: DispatchStats::default(),
        }
    }

    /// Install a freshly compiled rule graph and reset to `default` mode.
    ///
    /// Called once at startup and again on every accepted reload, always
    /// between events.
    pub fn install(&mut self, mappings: Rc<Mappings>) {
        self.mappings = mappings;
        self.current_mode = Some(DEFAULT_MODE.to_string());
    }

    pub fn current_mode(&self) -> Option<&str> {
        self.current_mode.as_deref()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// The cell the platform's frontmost-app watcher writes into.
    pub fn front_app_handle(&self) -> Arc<Mutex<String>> {
        Arc::clone(&self.front_app)
    }

    /// Record the frontmost process name (lower-cased).
    pub fn set_front_app(&self, name: &str) {
        if let Ok(mut cached) = self.front_app.lock() {
            *cached = name.to_lowercase();
        }
    }

    /// Decide what to do with one event. This is the only place rules are
    /// consulted; it performs a single map lookup per event.
    pub fn dispatch(&mut self, event: &KeyEvent) -> Decision {
        if event.synthetic {
            self.stats.self_generated_exits += 1;
            return Decision::Pass;
        }
        let Some(mode_name) = self.current_mode.clone() else {
            self.stats.no_mode_exits += 1;
            return Decision::Pass;
        };

        let process = match self.front_app.lock() {
            Ok(cached) => cached.clone(),
            Err(_) => String::new(),
        };

        // The graph in hand at entry serves the whole event; a reload only
        // takes effect for the next one.
        let mappings = Rc::clone(&self.mappings);
        if mappings.is_blacklisted(&process) {
            self.stats.blacklisted_exits += 1;
            return Decision::Pass;
        }

        let Some((kind, keycode, mods)) = normalize(event) else {
            return Decision::Pass;
        };

        let Some(mode) = mappings.mode(&mode_name) else {
            self.stats.no_mode_exits += 1;
            return Decision::Pass;
        };

        let press_key = (keycode, mods.contains(ModifierSet::NX));
        let was_pressed = kind == EventKind::KeyUp && self.pressed.remove(&press_key);

        let hit = mode.lookup(mods, keycode).filter(|hotkey| {
            // On-release hotkeys fire on key-up, everything else on
            // key-down.
            hotkey.flags.contains(HotkeyFlags::ON_RELEASE) == (kind == EventKind::KeyUp)
        });
        let Some(hotkey) = hit.map(Rc::clone) else {
            return self.miss(mode.capture, was_pressed);
        };

        let Some(action) = hotkey.actions.select(&process).cloned() else {
            return self.miss(mode.capture, was_pressed);
        };

        match action {
            Action::Command(command) => {
                self.runner.run(mappings.shell(), &command);
                if hotkey.flags.contains(HotkeyFlags::PASSTHROUGH) {
                    Decision::Pass
                } else {
                    self.suppress(kind, press_key)
                }
            }
            Action::Forward(key) => {
                self.synth.post(key);
                if kind == EventKind::KeyDown {
                    self.pressed.insert(press_key);
                }
                Decision::Replace(key)
            }
            Action::Activate(name) => {
                debug!(mode = %name, "activating");
                self.current_mode = Some(name.clone());
                if let Some(command) = mappings.mode(&name).and_then(|m| m.on_enter.clone()) {
                    self.runner.run(mappings.shell(), &command);
                } else if mappings.mode(&name).is_none() {
                    warn!(mode = %name, "activation target vanished");
                }
                self.suppress(kind, press_key)
            }
            Action::Unbound => self.suppress(kind, press_key),
        }
    }

    fn suppress(&mut self, kind: EventKind, key: (u32, bool)) -> Decision {
        if kind == EventKind::KeyDown {
            self.pressed.insert(key);
        }
        Decision::Suppress
    }

    fn miss(&self, capture: bool, was_pressed: bool) -> Decision {
        if was_pressed || capture {
            Decision::Suppress
        } else {
            Decision::Pass
        }
    }
}

/// Turn an event into the (kind, keycode, lookup modifiers) triple the
/// matcher works on.
///
/// `flags_changed` events participate only for hotkeys whose key token is
/// itself a modifier: the event becomes a key-down or key-up of that
/// modifier key, with the key's own contribution removed from the lookup
/// modifiers. Other events are taken as-is.
fn normalize(event: &KeyEvent) -> Option<(EventKind, u32, ModifierSet)> {
    match event.kind {
        EventKind::KeyDown | EventKind::KeyUp => Some((event.kind, event.keycode, event.mods)),
        EventKind::FlagsChanged => {
            let own = keycodes::modifier_bits_for_keycode(event.keycode)?;
            let side = own
                & !(ModifierSet::CMD
                    | ModifierSet::SHIFT
                    | ModifierSet::ALT
                    | ModifierSet::CONTROL);
            let kind = if event.mods.intersects(side) {
                EventKind::KeyDown
            } else {
                EventKind::KeyUp
            };
            let mut mods = event.mods & !side;
            // Keep the family's generic bit while the other side is held.
            let family = family_of(own);
            if !mods.intersects(family & !own & !generic_bits()) {
                mods &= !(own & generic_bits());
            }
            Some((kind, event.keycode, mods))
        }
    }
}

fn generic_bits() -> ModifierSet {
    ModifierSet::CMD | ModifierSet::SHIFT | ModifierSet::ALT | ModifierSet::CONTROL
}

fn family_of(bits: ModifierSet) -> ModifierSet {
    for family in [
        ModifierSet::CMD | ModifierSet::LCMD | ModifierSet::RCMD,
        ModifierSet::SHIFT | ModifierSet::LSHIFT | ModifierSet::RSHIFT,
        ModifierSet::ALT | ModifierSet::LALT | ModifierSet::RALT,
        ModifierSet::CONTROL | ModifierSet::LCONTROL | ModifierSet::RCONTROL,
    ] {
        if family.intersects(bits) {
            return family;
        }
    }
    bits
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;

    use super::*;
    use crate::keyboard::KeyPress;
    use crate::keycodes::KeyCatalog;
    use crate::parser;

    #[derive(Default)]
    struct Recorder {
        commands: Rc<RefCell<Vec<(String, String)>>>,
        keys: Rc<RefCell<Vec<KeyPress>>>,
    }

    struct RecordingRunner(Rc<RefCell<Vec<(String, String)>>>);
    impl CommandRunner for RecordingRunner {
        fn run(&mut self, shell: &str, command: &str) {
            self.0.borrow_mut().push((shell.into(), command.into()));
        }
    }

    struct RecordingSynth(Rc<RefCell<Vec<KeyPress>>>);
    impl Synthesizer for RecordingSynth {
        fn post(&mut self, key: KeyPress) {
            self.0.borrow_mut().push(key);
        }
        fn type_text(&mut self, _text: &str) {}
    }

    fn dispatcher_for(config: &str) -> (Dispatcher, Recorder) {
        let recorder = Recorder::default();
        let outcome = parser::parse_str(config, Path::new("skhdrc"), &KeyCatalog::us_ansi());
        assert!(outcome.errors.is_empty(), "config errors: {:?}", outcome.errors);
        let mut dispatcher = Dispatcher::new(
            Box::new(RecordingRunner(Rc::clone(&recorder.commands))),
            Box::new(RecordingSynth(Rc::clone(&recorder.keys))),
        );
        dispatcher.install(Rc::new(outcome.mappings));
        dispatcher.set_front_app("finder");
        (dispatcher, recorder)
    }

    fn cmd_mods() -> ModifierSet {
        ModifierSet::CMD | ModifierSet::LCMD
    }

    #[test]
    fn simple_command_is_suppressed_and_run() {
        let (mut dispatcher, recorder) = dispatcher_for(".shell \"/bin/bash\"\ncmd - space : echo hi");
        let decision = dispatcher.dispatch(&KeyEvent::down(0x31, cmd_mods()));
        assert_eq!(decision, Decision::Suppress);
        assert_eq!(
            recorder.commands.borrow().as_slice(),
            &[("/bin/bash".to_string(), "echo hi".to_string())]
        );
    }

    #[test]
    fn per_process_override_selects_by_frontmost_app() {
        let config = "cmd - t [\n    \"terminal\" : open -a Terminal\n    * : echo other\n]";
        let (mut dispatcher, recorder) = dispatcher_for(config);

        dispatcher.set_front_app("Terminal");
        dispatcher.dispatch(&KeyEvent::down(0x11, cmd_mods()));
        dispatcher.set_front_app("safari");
        dispatcher.dispatch(&KeyEvent::down(0x11, cmd_mods()));

        let commands = recorder.commands.borrow();
        assert_eq!(commands[0].1, "open -a Terminal");
        assert_eq!(commands[1].1, "echo other");
    }

    #[test]
    fn passthrough_runs_the_command_and_passes() {
        let (mut dispatcher, recorder) = dispatcher_for("cmd - s -> : sync");
        dispatcher.set_front_app("emacs");
        let decision = dispatcher.dispatch(&KeyEvent::down(0x01, cmd_mods()));
        assert_eq!(decision, Decision::Pass);
        assert_eq!(recorder.commands.borrow()[0].1, "sync");
    }

    #[test]
    fn mode_activation_sequence() {
        let config = ":: window\n\
                      cmd - w ; window\n\
                      window < h : echo left\n\
                      window < escape ; default";
        let (mut dispatcher, recorder) = dispatcher_for(config);

        assert_eq!(
            dispatcher.dispatch(&KeyEvent::down(0x0d, cmd_mods())),
            Decision::Suppress
        );
        assert_eq!(dispatcher.current_mode(), Some("window"));

        assert_eq!(
            dispatcher.dispatch(&KeyEvent::down(0x04, ModifierSet::empty())),
            Decision::Suppress
        );
        assert_eq!(recorder.commands.borrow()[0].1, "echo left");

        assert_eq!(
            dispatcher.dispatch(&KeyEvent::down(0x35, ModifierSet::empty())),
            Decision::Suppress
        );
        assert_eq!(dispatcher.current_mode(), Some(DEFAULT_MODE));
    }

    #[test]
    fn entering_a_mode_runs_its_on_enter_command() {
        let config = ":: resize : echo resizing\ncmd - r ; resize";
        let (mut dispatcher, recorder) = dispatcher_for(config);
        dispatcher.dispatch(&KeyEvent::down(0x0f, cmd_mods()));
        assert_eq!(recorder.commands.borrow()[0].1, "echo resizing");
    }

    #[test]
    fn blacklisted_process_always_passes() {
        let config = ".blacklist [ \"password-manager\" ]\ncmd - v : echo pasted";
        let (mut dispatcher, recorder) = dispatcher_for(config);
        dispatcher.set_front_app("password-manager");
        let decision = dispatcher.dispatch(&KeyEvent::down(0x09, cmd_mods()));
        assert_eq!(decision, Decision::Pass);
        assert!(recorder.commands.borrow().is_empty());
        assert_eq!(dispatcher.stats().blacklisted_exits, 1);
    }

    #[test]
    fn self_generated_events_pass_without_lookup() {
        let (mut dispatcher, recorder) = dispatcher_for("cmd - space : echo hi");
        let mut event = KeyEvent::down(0x31, cmd_mods());
        event.synthetic = true;
        assert_eq!(dispatcher.dispatch(&event), Decision::Pass);
        assert!(recorder.commands.borrow().is_empty());
        assert_eq!(dispatcher.stats().self_generated_exits, 1);
    }

    #[test]
    fn forward_posts_the_replacement_combo() {
        let (mut dispatcher, recorder) = dispatcher_for("f13 | escape");
        let decision = dispatcher.dispatch(&KeyEvent::down(0x69, ModifierSet::empty()));
        let escape = KeyPress {
            mods: ModifierSet::empty(),
            keycode: 0x35,
        };
        assert_eq!(decision, Decision::Replace(escape));
        assert_eq!(recorder.keys.borrow().as_slice(), &[escape]);
    }

    #[test]
    fn capture_mode_swallows_misses() {
        let config = ":: trap @\ncmd - m ; trap";
        let (mut dispatcher, _recorder) = dispatcher_for(config);
        dispatcher.dispatch(&KeyEvent::down(0x2e, cmd_mods()));
        assert_eq!(dispatcher.current_mode(), Some("trap"));
        // No binding for `q` in trap mode, but the mode captures.
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::down(0x0c, ModifierSet::empty())),
            Decision::Suppress
        );
    }

    #[test]
    fn non_capture_mode_passes_misses() {
        let (mut dispatcher, _recorder) = dispatcher_for("cmd - space : echo hi");
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::down(0x0c, ModifierSet::empty())),
            Decision::Pass
        );
    }

    #[test]
    fn suppressed_down_swallows_the_matching_up() {
        let (mut dispatcher, _recorder) = dispatcher_for("cmd - space : echo hi");
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::down(0x31, cmd_mods())),
            Decision::Suppress
        );
        // The key-up arrives after the modifiers were released.
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::up(0x31, ModifierSet::empty())),
            Decision::Suppress
        );
        // Only once.
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::up(0x31, ModifierSet::empty())),
            Decision::Pass
        );
    }

    #[test]
    fn passthrough_does_not_swallow_the_up() {
        let (mut dispatcher, _recorder) = dispatcher_for("cmd - s -> : sync");
        dispatcher.dispatch(&KeyEvent::down(0x01, cmd_mods()));
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::up(0x01, cmd_mods())),
            Decision::Pass
        );
    }

    #[test]
    fn on_release_hotkeys_fire_on_key_up_only() {
        let (mut dispatcher, recorder) = dispatcher_for("cmd - x @ : echo released");
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::down(0x07, cmd_mods())),
            Decision::Pass
        );
        assert!(recorder.commands.borrow().is_empty());
        assert_eq!(
            dispatcher.dispatch(&KeyEvent::up(0x07, cmd_mods())),
            Decision::Suppress
        );
        assert_eq!(recorder.commands.borrow()[0].1, "echo released");
    }

    #[test]
    fn flags_changed_drives_modifier_key_hotkeys() {
        // 0x3e is the right-control key.
        let (mut dispatcher, recorder) = dispatcher_for("0x3E : echo rctrl");
        let press = KeyEvent {
            kind: EventKind::FlagsChanged,
            keycode: 0x3e,
            mods: ModifierSet::CONTROL | ModifierSet::RCONTROL,
            synthetic: false,
        };
        assert_eq!(dispatcher.dispatch(&press), Decision::Suppress);
        assert_eq!(recorder.commands.borrow().len(), 1);

        let release = KeyEvent {
            kind: EventKind::FlagsChanged,
            keycode: 0x3e,
            mods: ModifierSet::empty(),
            synthetic: false,
        };
        // The release is swallowed because the press was.
        assert_eq!(dispatcher.dispatch(&release), Decision::Suppress);
        assert_eq!(recorder.commands.borrow().len(), 1);
    }

    #[test]
    fn flags_changed_for_unbound_modifiers_passes() {
        let (mut dispatcher, _recorder) = dispatcher_for("cmd - space : echo hi");
        let press = KeyEvent {
            kind: EventKind::FlagsChanged,
            keycode: 0x38,
            mods: ModifierSet::SHIFT | ModifierSet::LSHIFT,
            synthetic: false,
        };
        assert_eq!(dispatcher.dispatch(&press), Decision::Pass);
    }

    #[test]
    fn media_keys_resolve_with_the_nx_bit() {
        let (mut dispatcher, recorder) = dispatcher_for("play : echo toggle");
        let decision = dispatcher.dispatch(&KeyEvent::down(0x10, ModifierSet::NX));
        assert_eq!(decision, Decision::Suppress);
        assert_eq!(recorder.commands.borrow()[0].1, "echo toggle");
    }

    #[test]
    fn reload_resets_to_default_mode() {
        let config = ":: window\ncmd - w ; window";
        let (mut dispatcher, _recorder) = dispatcher_for(config);
        dispatcher.dispatch(&KeyEvent::down(0x0d, cmd_mods()));
        assert_eq!(dispatcher.current_mode(), Some("window"));

        let outcome =
            parser::parse_str("cmd - n : echo new", Path::new("skhdrc"), &KeyCatalog::us_ansi());
        dispatcher.install(Rc::new(outcome.mappings));
        assert_eq!(dispatcher.current_mode(), Some(DEFAULT_MODE));
    }

    #[test]
    fn dispatch_is_deterministic() {
        let config = ":: window\ncmd - w ; window\nwindow < escape ; default\ncmd - space : echo hi";
        let events = [
            KeyEvent::down(0x31, cmd_mods()),
            KeyEvent::up(0x31, cmd_mods()),
            KeyEvent::down(0x0d, cmd_mods()),
            KeyEvent::down(0x31, ModifierSet::empty()),
            KeyEvent::down(0x35, ModifierSet::empty()),
            KeyEvent::down(0x31, cmd_mods()),
        ];
        let run = || {
            let (mut dispatcher, _recorder) = dispatcher_for(config);
            events
                .iter()
                .map(|event| dispatcher.dispatch(event))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
