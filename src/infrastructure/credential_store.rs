use crate::infrastructure::error::InfraError;
use std::sync::Mutex;

pub trait ApiKeyStore: Send + Sync {
    fn save_api_key(&self, api_key: &str) -> Result<(), InfraError>;
    fn load_api_key(&self) -> Result<Option<String>, InfraError>;
    fn delete_api_key(&self) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct KeyringApiKeyStore {
    service_name: String,
    account_name: String,
}

impl KeyringApiKeyStore {
    pub fn new(service_name: impl Into<String>, account_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account_name: account_name.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, &self.account_name)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringApiKeyStore {
    fn default() -> Self {
        Self::new("myweek.planner", "default")
    }
}

impl ApiKeyStore for KeyringApiKeyStore {
    fn save_api_key(&self, api_key: &str) -> Result<(), InfraError> {
        self.entry()?
            .set_password(api_key)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_api_key(&self) -> Result<Option<String>, InfraError> {
        match self.entry()?.get_password() {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }

    fn delete_api_key(&self) -> Result<(), InfraError> {
        match self.entry()?.delete_credential() {
            Ok(_) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryApiKeyStore {
    api_key: Mutex<Option<String>>,
}

impl ApiKeyStore for InMemoryApiKeyStore {
    fn save_api_key(&self, api_key: &str) -> Result<(), InfraError> {
        let mut guard = self
            .api_key
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = Some(api_key.to_string());
        Ok(())
    }

    fn load_api_key(&self) -> Result<Option<String>, InfraError> {
        let guard = self
            .api_key
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        Ok(guard.clone())
    }

    fn delete_api_key(&self) -> Result<(), InfraError> {
        let mut guard = self
            .api_key
            .lock()
            .map_err(|error| InfraError::Credential(format!("in-memory lock poisoned: {error}")))?;
        *guard = None;
        Ok(())
    }
}
