//! Accès sérialisé à l'implémentation d'un service local.

use std::fmt;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{actions::ArgumentValues, variable_types::StateValue};

/// Implémentation d'un service local.
///
/// Le code utilisateur implémente ce trait ; le [`ServiceManager`] garantit
/// qu'un seul appel est en cours à la fois sur une même instance.
/// Retourner une [`ActionError`](crate::actions::ActionError) via `anyhow`
/// conserve son code UPnP, toute autre erreur devient `ACTION_FAILED`.
#[async_trait]
pub trait ServiceCommandTarget: Send {
    /// Valeur courante d'une variable d'état
    async fn read_state(&mut self, variable: &str) -> Result<StateValue>;

    /// Exécute une action et retourne ses sorties, indexées par nom
    async fn invoke_action(&mut self, action: &str, inputs: &ArgumentValues) -> Result<ArgumentValues>;
}

/// Commande exécutée contre l'implémentation.
#[derive(Debug, Clone, Copy)]
pub enum Command<'a> {
    ReadState(&'a str),
    ReadStates(&'a [String]),
    InvokeAction {
        action: &'a str,
        inputs: &'a ArgumentValues,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    State(StateValue),
    States(Vec<(String, StateValue)>),
    Outputs(ArgumentValues),
}

/// Point d'exclusion mutuelle autour de l'implémentation d'un service.
pub struct ServiceManager {
    target: Mutex<Box<dyn ServiceCommandTarget>>,
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ServiceManager").finish_non_exhaustive()
    }
}

impl ServiceManager {
    pub fn new(target: impl ServiceCommandTarget + 'static) -> Self {
        Self {
            target: Mutex::new(Box::new(target)),
        }
    }

    /// Exécute une commande en tenant le verrou de l'implémentation.
    ///
    /// `ReadStates` lit toutes les variables sous le même verrou.
    pub async fn execute(&self, command: Command<'_>) -> Result<CommandOutput> {
        let mut target = self.target.lock().await;
        match command {
            Command::ReadState(name) => Ok(CommandOutput::State(target.read_state(name).await?)),
            Command::ReadStates(names) => {
                let mut values = Vec::with_capacity(names.len());
                for name in names {
                    values.push((name.clone(), target.read_state(name).await?));
                }
                Ok(CommandOutput::States(values))
            }
            Command::InvokeAction { action, inputs } => {
                Ok(CommandOutput::Outputs(target.invoke_action(action, inputs).await?))
            }
        }
    }

    pub async fn read_state(&self, name: &str) -> Result<StateValue> {
        match self.execute(Command::ReadState(name)).await? {
            CommandOutput::State(value) => Ok(value),
            other => Err(anyhow!("unexpected command output {:?}", other)),
        }
    }

    pub async fn read_states(&self, names: &[String]) -> Result<Vec<(String, StateValue)>> {
        match self.execute(Command::ReadStates(names)).await? {
            CommandOutput::States(values) => Ok(values),
            other => Err(anyhow!("unexpected command output {:?}", other)),
        }
    }

    pub async fn invoke_action(&self, action: &str, inputs: &ArgumentValues) -> Result<ArgumentValues> {
        match self.execute(Command::InvokeAction { action, inputs }).await? {
            CommandOutput::Outputs(outputs) => Ok(outputs),
            other => Err(anyhow!("unexpected command output {:?}", other)),
        }
    }
}
