use keyring::Entry;

const SERVICE_NAME: &str = "com.smartsort.renamer";

/// Environment variable consulted last (also read from `.env`)
const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Credential lookup for the external renamer
pub struct CredentialManager;

impl CredentialManager {
    /// Resolve the API key: explicit config value, then the OS keychain, then the environment.
    pub fn resolve_api_key(configured: Option<&str>, provider: &str) -> Option<String> {
        if let Some(key) = configured.map(str::trim).filter(|k| !k.is_empty()) {
            return Some(key.to_string());
        }

        match Self::get_api_key(provider) {
            Ok(key) => return Some(key),
            Err(e) => tracing::debug!(provider, error = %e, "No API key in keychain"),
        }

        std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    /// Store an API key in the OS keychain
    pub fn store_api_key(provider: &str, api_key: &str) -> Result<(), String> {
        let entry = Entry::new(SERVICE_NAME, provider)
            .map_err(|e| format!("Keychain unavailable: {}", e))?;
        entry
            .set_password(api_key)
            .map_err(|e| format!("Failed to store API key: {}", e))?;
        tracing::info!(provider, "Stored API key in keychain");
        Ok(())
    }

    /// Get an API key from the OS keychain
    pub fn get_api_key(provider: &str) -> Result<String, String> {
        let entry = Entry::new(SERVICE_NAME, provider)
            .map_err(|e| format!("Keychain unavailable: {}", e))?;
        entry
            .get_password()
            .map_err(|e| format!("API key not found: {}", e))
    }

    /// Delete an API key from the OS keychain
    pub fn delete_api_key(provider: &str) -> Result<(), String> {
        if let Ok(entry) = Entry::new(SERVICE_NAME, provider) {
            let _ = entry.delete_credential();
        }
        Ok(())
    }
}
