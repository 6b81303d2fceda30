//! Service hébergé localement.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
    actions::{ActionError, ActionInvocation, ArgumentValues, ErrorCode, QUERY_RETURN_ARG, QUERY_VAR_NAME_ARG},
    gena::LocalEventPublisher,
    services::{DeviceService, Service, ServiceCommandTarget, ServiceError, ServiceManager},
    types::Udn,
    variable_types::StateValue,
};

/// Service local : description, implémentation et abonnés.
///
/// Sans [`ServiceManager`], le service est inerte : il est décrit et publié
/// mais toute invocation échoue avec `ACTION_FAILED`.
pub struct LocalService {
    service: Arc<Service>,
    manager: Option<Arc<ServiceManager>>,
    publisher: Arc<LocalEventPublisher>,
    device_udn: OnceCell<Udn>,
}

impl fmt::Debug for LocalService {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LocalService")
            .field("service_id", self.service.service_id())
            .field("service_type", self.service.service_type())
            .field("device_udn", &self.device_udn.get())
            .field("inert", &self.manager.is_none())
            .finish()
    }
}

impl LocalService {
    pub fn new(service: Service, manager: Option<ServiceManager>) -> Self {
        let publisher = LocalEventPublisher::new(
            service.service_id().clone(),
            service.state_variables(),
        );
        Self {
            service: Arc::new(service),
            manager: manager.map(Arc::new),
            publisher: Arc::new(publisher),
            device_udn: OnceCell::new(),
        }
    }

    /// Service adossé à une implémentation
    pub fn with_target(service: Service, target: impl ServiceCommandTarget + 'static) -> Self {
        Self::new(service, Some(ServiceManager::new(target)))
    }

    /// Service sans implémentation
    pub fn inert(service: Service) -> Self {
        Self::new(service, None)
    }

    pub fn manager(&self) -> Option<&Arc<ServiceManager>> {
        self.manager.as_ref()
    }

    pub fn is_inert(&self) -> bool {
        self.manager.is_none()
    }

    pub fn publisher(&self) -> &Arc<LocalEventPublisher> {
        &self.publisher
    }

    fn require_manager(&self) -> Result<&Arc<ServiceManager>, ActionError> {
        self.manager.as_ref().ok_or_else(|| {
            ActionError::action_failed(format!(
                "Service '{}' has no implementation",
                self.service.service_id()
            ))
        })
    }

    /// Exécute une invocation reçue et y attache ses sorties ou son échec.
    ///
    /// Les sorties retournées par l'implémentation sont validées contre les
    /// arguments déclarés ; une sortie absente ou invalide fait échouer
    /// l'invocation avec `ACTION_FAILED`.
    pub async fn execute(&self, invocation: &mut ActionInvocation) {
        let result = if invocation.action().is_query_state_variable() {
            self.query_state_variable(invocation).await
        } else {
            self.invoke(invocation).await
        };
        match result {
            Ok(outputs) => invocation.set_outputs(outputs),
            Err(e) => {
                warn!(
                    service = %self.service.service_id(),
                    action = %invocation.action().name(),
                    "❌ Action failed: {}", e
                );
                invocation.set_failure(e);
            }
        }
    }

    async fn invoke(&self, invocation: &ActionInvocation) -> Result<ArgumentValues, ActionError> {
        let manager = self.require_manager()?;
        let action = invocation.action();
        debug!(service = %self.service.service_id(), action = %action.name(), "⚙️ Invoking action");

        let mut produced = manager
            .invoke_action(action.name(), invocation.inputs())
            .await
            .map_err(ActionError::from_anyhow)?;

        let mut outputs = ArgumentValues::new();
        for argument in action.outputs() {
            let value = produced.remove(argument.name()).ok_or_else(|| {
                ActionError::action_failed(format!("Implementation returned no value for output '{}'", argument.name()))
            })?;
            let value = argument
                .related_state_variable()
                .coerce(&value)
                .map_err(|e| ActionError::action_failed(format!("Invalid output '{}': {}", argument.name(), e)))?;
            outputs.insert(argument.name().to_string(), value);
        }
        Ok(outputs)
    }

    /// `QueryStateVariable` : lit directement une variable déclarée.
    async fn query_state_variable(&self, invocation: &ActionInvocation) -> Result<ArgumentValues, ActionError> {
        let name = invocation
            .input(QUERY_VAR_NAME_ARG)
            .map(|v| v.to_string())
            .ok_or_else(|| ActionError::invalid_args("Missing varName"))?;
        if self.service.state_variable(&name).is_none() {
            return Err(ActionError::new(
                ErrorCode::InvalidVariable,
                format!("No state variable '{}'", name),
            ));
        }
        let value = self
            .require_manager()?
            .read_state(&name)
            .await
            .map_err(ActionError::from_anyhow)?;

        let mut outputs = ArgumentValues::new();
        outputs.insert(QUERY_RETURN_ARG.to_string(), StateValue::String(value.to_string()));
        Ok(outputs)
    }

    /// Valeurs courantes de toutes les variables évènementielles, sous
    /// forme texte (événement initial).
    pub async fn evented_values(&self) -> Vec<(String, String)> {
        let Some(manager) = &self.manager else {
            return self
                .service
                .evented_variables()
                .filter_map(|v| v.default_value().map(|d| (v.name().to_string(), d.to_string())))
                .collect();
        };
        let names: Vec<String> = self
            .service
            .evented_variables()
            .map(|v| v.name().to_string())
            .collect();
        match manager.read_states(&names).await {
            Ok(values) => values
                .into_iter()
                .map(|(name, value)| (name, value.to_string()))
                .collect(),
            Err(e) => {
                warn!(service = %self.service.service_id(), "❌ Cannot read evented state: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Publie des changements déjà connus de l'appelant.
    pub async fn publish(&self, changes: Vec<(String, StateValue)>) {
        self.publisher.publish(changes).await;
    }

    /// Relit les variables nommées via l'implémentation et publie leurs
    /// valeurs aux abonnés.
    pub async fn notify_state_changed(&self, names: &[&str]) {
        let Some(manager) = &self.manager else {
            return;
        };
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        match manager.read_states(&names).await {
            Ok(values) => self.publisher.publish(values).await,
            Err(e) => warn!(service = %self.service.service_id(), "❌ Cannot read changed state: {:#}", e),
        }
    }
}

impl DeviceService for LocalService {
    fn service(&self) -> &Arc<Service> {
        &self.service
    }

    fn device_udn(&self) -> Option<&Udn> {
        self.device_udn.get()
    }

    fn bind_device(&self, udn: &Udn) -> Result<(), ServiceError> {
        match self.device_udn.get() {
            Some(bound) if bound != udn => Err(ServiceError::AlreadyBound(bound.clone())),
            Some(_) => Ok(()),
            None => {
                let _ = self.device_udn.set(udn.clone());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, Argument, QUERY_STATE_VARIABLE_ACTION};
    use crate::state_variables::StateVariable;
    use crate::types::{ServiceId, ServiceType};
    use crate::variable_types::StateVarType;
    use anyhow::anyhow;
    use async_trait::async_trait;

    struct Renderer {
        volume: u16,
    }

    #[async_trait]
    impl ServiceCommandTarget for Renderer {
        async fn read_state(&mut self, variable: &str) -> anyhow::Result<StateValue> {
            match variable {
                "Volume" => Ok(StateValue::UI2(self.volume)),
                _ => Err(anyhow!("no such variable")),
            }
        }

        async fn invoke_action(&mut self, action: &str, inputs: &ArgumentValues) -> anyhow::Result<ArgumentValues> {
            match action {
                "SetVolume" => {
                    self.volume = inputs
                        .get("DesiredVolume")
                        .and_then(StateValue::as_i64)
                        .ok_or_else(|| anyhow!("missing volume"))? as u16;
                    Ok(ArgumentValues::new())
                }
                "GetVolume" => Ok([("CurrentVolume".to_string(), StateValue::UI2(self.volume))].into()),
                "Broken" => Ok(ArgumentValues::new()),
                "Refuse" => Err(ActionError::new(ErrorCode::Other(712), "busy").into()),
                _ => Err(anyhow!("boom")),
            }
        }
    }

    fn service() -> Service {
        let volume = Arc::new(StateVariable::new("Volume", StateVarType::UI2).with_events(true));
        Service::new(
            ServiceType::uda("RenderingControl", 1),
            ServiceId::uda("RenderingControl"),
            vec![volume.clone()],
            vec![
                Action::new("GetVolume").with_argument(Argument::output("CurrentVolume", volume.clone())),
                Action::new("SetVolume").with_argument(Argument::input("DesiredVolume", volume.clone())),
                Action::new("Broken").with_argument(Argument::output("CurrentVolume", volume.clone())),
                Action::new("Refuse"),
                Action::new("Crash"),
            ],
        )
        .unwrap()
    }

    async fn run(local: &LocalService, name: &str, inputs: &[(&str, StateValue)]) -> ActionInvocation {
        let action = local.service().action(name).unwrap().clone();
        let mut invocation = ActionInvocation::new(action);
        for (k, v) in inputs {
            invocation.set_input(k, v.clone()).unwrap();
        }
        local.execute(&mut invocation).await;
        invocation
    }

    #[tokio::test]
    async fn test_execute_and_read_back() {
        let local = LocalService::with_target(service(), Renderer { volume: 3 });
        let set = run(&local, "SetVolume", &[("DesiredVolume", StateValue::UI2(42))]).await;
        assert!(!set.is_failed());
        let get = run(&local, "GetVolume", &[]).await;
        assert_eq!(get.output("CurrentVolume"), Some(&StateValue::UI2(42)));
    }

    #[tokio::test]
    async fn test_failures_are_mapped() {
        let local = LocalService::with_target(service(), Renderer { volume: 3 });
        let broken = run(&local, "Broken", &[]).await;
        assert_eq!(broken.failure().unwrap().code, ErrorCode::ActionFailed);
        let refused = run(&local, "Refuse", &[]).await;
        assert_eq!(refused.failure().unwrap().code, ErrorCode::Other(712));
        let crashed = run(&local, "Crash", &[]).await;
        assert_eq!(crashed.failure().unwrap().code, ErrorCode::ActionFailed);
    }

    #[tokio::test]
    async fn test_inert_service() {
        let local = LocalService::inert(service());
        let get = run(&local, "GetVolume", &[]).await;
        assert_eq!(get.failure().unwrap().code, ErrorCode::ActionFailed);
    }

    #[tokio::test]
    async fn test_query_state_variable() {
        let local = LocalService::with_target(service(), Renderer { volume: 7 });
        let mut invocation = ActionInvocation::new(QUERY_STATE_VARIABLE_ACTION.clone());
        invocation.set_input(QUERY_VAR_NAME_ARG, "Volume").unwrap();
        local.execute(&mut invocation).await;
        assert_eq!(invocation.output(QUERY_RETURN_ARG), Some(&StateValue::String("7".into())));

        let mut unknown = ActionInvocation::new(QUERY_STATE_VARIABLE_ACTION.clone());
        unknown.set_input(QUERY_VAR_NAME_ARG, "Nope").unwrap();
        local.execute(&mut unknown).await;
        assert_eq!(unknown.failure().unwrap().code, ErrorCode::InvalidVariable);
    }

    #[test]
    fn test_bind_device_once() {
        let local = LocalService::inert(service());
        let udn = Udn::random();
        local.bind_device(&udn).unwrap();
        local.bind_device(&udn).unwrap();
        assert!(matches!(local.bind_device(&Udn::random()), Err(ServiceError::AlreadyBound(_))));
        assert_eq!(local.reference().unwrap().udn, udn);
    }
}
