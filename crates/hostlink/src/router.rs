//! Name-based command dispatch.
//!
//! The router owns the handler registry. Registration happens through
//! `&mut self` before the router is shared, so routing itself takes no locks;
//! lazily constructed handlers are cached in a once-cell on first use.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::envelope::{ContextProvider, Envelope, ResponseBuilder};
use crate::error_code::ErrorCode;
use crate::handler::CommandHandler;
use crate::panic_message;

/// Tracing target for routing.
pub(crate) const ROUTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::router");

/// Builds a handler on first use.
pub type HandlerFactory<H> = Box<dyn Fn() -> Box<dyn CommandHandler<H>> + Send + Sync>;

enum Registration<H: ContextProvider> {
    Instance(Box<dyn CommandHandler<H>>),
    Lazy {
        factory: HandlerFactory<H>,
        slot: OnceCell<Box<dyn CommandHandler<H>>>,
    },
}

impl<H: ContextProvider> Registration<H> {
    fn resolve(&self, name: &str) -> &dyn CommandHandler<H> {
        match self {
            Self::Instance(handler) => handler.as_ref(),
            Self::Lazy { factory, slot } => slot
                .get_or_init(|| {
                    debug!(target: ROUTER_TARGET, command = name, "instantiating handler");
                    factory()
                })
                .as_ref(),
        }
    }
}

/// Registry from command names to handlers.
pub struct CommandRouter<H: ContextProvider> {
    handlers: HashMap<String, Registration<H>>,
}

impl<H: ContextProvider> Default for CommandRouter<H> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<H: ContextProvider> CommandRouter<H> {
    /// An empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ready-made handler under its own command name.
    ///
    /// Registering a name twice keeps the later handler.
    pub fn register_handler(&mut self, handler: impl CommandHandler<H> + 'static) {
        let name = handler.command_name().to_owned();
        self.insert(name, Registration::Instance(Box::new(handler)));
    }

    /// Registers a handler built on first use of `name`.
    ///
    /// The factory runs at most once; the handler it returns should report
    /// `name` as its command name.
    pub fn register_handler_factory<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn CommandHandler<H>> + Send + Sync + 'static,
    {
        self.insert(
            name.into(),
            Registration::Lazy {
                factory: Box::new(factory),
                slot: OnceCell::new(),
            },
        );
    }

    fn insert(&mut self, name: String, registration: Registration<H>) {
        let lazy = matches!(registration, Registration::Lazy { .. });
        if self.handlers.insert(name.clone(), registration).is_some() {
            warn!(
                target: ROUTER_TARGET,
                command = %name,
                "replacing existing handler registration"
            );
        }
        info!(target: ROUTER_TARGET, command = %name, lazy, "registered handler");
    }

    /// Returns true when `name` is registered.
    #[must_use]
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn get_registered_commands(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Routes one request and returns its response envelope.
    ///
    /// `request` is the decoded wire document: an object, or a string holding
    /// one. Never panics; any failure while dispatching is reported as
    /// `UNKNOWN_ERROR`.
    pub fn route_command(&self, request: &Value, host: &mut H) -> Envelope {
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request, host))) {
            Ok(envelope) => envelope,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(target: ROUTER_TARGET, %message, "routing failed");
                ResponseBuilder::new(&*host).error(
                    ErrorCode::UnknownError,
                    format!("Error routing command: {message}"),
                )
            }
        }
    }

    fn dispatch(&self, request: &Value, host: &mut H) -> Envelope {
        let command = match Command::from_value(request) {
            Ok(command) => command,
            Err(error) => {
                debug!(target: ROUTER_TARGET, %error, "rejected malformed command");
                return ResponseBuilder::new(&*host)
                    .error(ErrorCode::InvalidCommand, error.to_string())
                    .with_suggestions(error.suggestions().iter().copied());
            }
        };

        let name = command.name();
        let Some(registration) = self.handlers.get(name) else {
            debug!(target: ROUTER_TARGET, command = name, "unknown command");
            return ResponseBuilder::new(&*host)
                .error(
                    ErrorCode::InvalidCommand,
                    format!("Unknown command type: {name}"),
                )
                .with_suggestions(self.unknown_command_suggestions(name));
        };

        debug!(target: ROUTER_TARGET, command = name, "routing command");
        registration.resolve(name).handle(command.params(), host)
    }

    fn unknown_command_suggestions(&self, name: &str) -> Vec<String> {
        let mut suggestions = vec![format!("Command '{name}' is not registered")];
        if let Some(close) = self.closest_command(name) {
            suggestions.push(format!("Did you mean '{close}'?"));
        }
        suggestions.push("Check available commands".to_owned());
        suggestions.push("Verify command name spelling".to_owned());
        suggestions
    }

    fn closest_command(&self, name: &str) -> Option<&str> {
        let length = name.chars().count();
        let limit = (length / 3).max(2);
        let longest = self
            .handlers
            .keys()
            .map(|candidate| candidate.chars().count())
            .max()?;
        // Names this far from every candidate cannot be within `limit`.
        if length > longest + limit {
            return None;
        }
        self.handlers
            .keys()
            .filter(|candidate| candidate.chars().count().abs_diff(length) <= limit)
            .map(|candidate| (edit_distance(name, candidate), candidate.as_str()))
            .filter(|(distance, _)| *distance <= limit)
            .min()
            .map(|(_, candidate)| candidate)
    }
}

fn edit_distance(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0; right.len() + 1];
    for (i, left_char) in left.chars().enumerate() {
        current[0] = i + 1;
        for (j, right_char) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(left_char != *right_char);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}
