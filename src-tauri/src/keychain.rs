use keyring::Entry;
use log::{debug, error, info};
use secrecy::{ExposeSecret, SecretString};

const SERVICE: &str = "app.vimo.desktop";
const ACCOUNT: &str = "remote_api_key";

fn entry() -> Result<Entry, keyring::Error> {
    Entry::new(SERVICE, ACCOUNT)
}

pub fn save_remote_api_key(key: &SecretString) -> Result<(), keyring::Error> {
    match entry()?.set_password(key.expose_secret()) {
        Ok(()) => {
            info!("Remote API key saved to keychain");
            Ok(())
        }
        Err(e) => {
            error!("Failed to save remote API key: {}", e);
            Err(e)
        }
    }
}

pub fn load_remote_api_key() -> Result<Option<SecretString>, keyring::Error> {
    match entry()?.get_password() {
        Ok(password) => Ok(Some(SecretString::from(password))),
        Err(keyring::Error::NoEntry) => {
            debug!("No remote API key in keychain");
            Ok(None)
        }
        Err(e) => {
            error!("Failed to load remote API key: {}", e);
            Err(e)
        }
    }
}

pub fn delete_remote_api_key() -> Result<(), keyring::Error> {
    match entry()?.delete_credential() {
        Ok(()) => {
            info!("Remote API key deleted from keychain");
            Ok(())
        }
        // Nothing to delete
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => {
            error!("Failed to delete remote API key: {}", e);
            Err(e)
        }
    }
}
