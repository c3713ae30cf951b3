//! The password-sealed keypair on disk, and the login flow around it.
//!
//! `<key_dir>/public.pem` holds the unencrypted public key;
//! `<key_dir>/private.pem` holds the PKCS#8 envelope sealed under the
//! user password. Both are loaded at login and held for the process
//! lifetime.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rand::Rng;
use sidewinder_crypto_core::keys;
use sidewinder_crypto_core::{CryptoError, KeyPair};
use tracing::info;

use crate::ui;

const PRIVATE_FILE: &str = "private.pem";
const PUBLIC_FILE: &str = "public.pem";

#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    /// Key files are missing; the account has not been created yet.
    #[error("no account found")]
    NoAccount,
    /// The private key would not unseal with the given password.
    #[error("invalid password")]
    BadPassword,
    /// The persisted public key does not belong to the private key.
    #[error("keystore inconsistent: public and private keys disagree")]
    KeyMismatch,
    /// The key directory is unreadable or unwritable.
    #[error("keystore unavailable: {0}")]
    Unavailable(#[from] io::Error),
    #[error(transparent)]
    Crypto(CryptoError),
}

pub type Result<T> = std::result::Result<T, KeystoreError>;

pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn private_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_FILE)
    }

    fn public_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_FILE)
    }

    /// True when both key files are on disk.
    pub fn account_exists(&self) -> bool {
        self.private_path().is_file() && self.public_path().is_file()
    }

    /// Generate a fresh identity and persist it sealed under `password`.
    pub fn create(&self, password: &str) -> Result<KeyPair> {
        let pair = KeyPair::generate().map_err(KeystoreError::Crypto)?;
        self.save(&pair, password)?;
        Ok(pair)
    }

    /// Persist the pair: public key unencrypted, private key sealed.
    pub fn save(&self, pair: &KeyPair, password: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let public_pem = keys::export_public_pem(pair.public()).map_err(KeystoreError::Crypto)?;
        let private_pem =
            keys::seal_private_pem(pair.private(), password).map_err(KeystoreError::Crypto)?;
        fs::write(self.public_path(), public_pem)?;
        fs::write(self.private_path(), private_pem.as_bytes())?;
        Ok(())
    }

    /// Load both halves, unsealing the private key with `password`.
    ///
    /// The loaded public key must be the one derived from the private
    /// key; otherwise the keystore is inconsistent and login fails.
    pub fn load(&self, password: &str) -> Result<KeyPair> {
        let private_pem = self.read(&self.private_path())?;
        let public_pem = self.read(&self.public_path())?;

        let private = keys::open_private_pem(&private_pem, password).map_err(|err| match err {
            CryptoError::BadPassphrase => KeystoreError::BadPassword,
            other => KeystoreError::Crypto(other),
        })?;
        let pair = KeyPair::from_private(private);

        let public = keys::import_public_pem(&public_pem).map_err(KeystoreError::Crypto)?;
        if pair.public() != &public {
            return Err(KeystoreError::KeyMismatch);
        }
        Ok(pair)
    }

    fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                KeystoreError::NoAccount
            } else {
                KeystoreError::Unavailable(err)
            }
        })
    }
}

/// Walk the user through login, creating the account on first run.
///
/// Wrong passwords are followed by a randomized 0-2 s sleep before the
/// re-prompt to blunt online guessing. Everything other than
/// `BadPassword` is surfaced to the caller.
pub fn login(store: &Keystore) -> Result<KeyPair> {
    if !store.account_exists() {
        return create_account(store);
    }

    println!("Please log in...");
    loop {
        let password = ui::prompt_password("Password: ")?;
        match store.load(&password) {
            Ok(pair) => {
                ui::print_green("Login successful.\n");
                return Ok(pair);
            }
            Err(KeystoreError::BadPassword) => {
                thread::sleep(Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..2.0)));
                ui::print_red("\nInvalid password. Please try again.");
            }
            Err(other) => return Err(other),
        }
    }
}

fn create_account(store: &Keystore) -> Result<KeyPair> {
    println!("Welcome to sidewinder! Enter a password for your new account to begin...");
    let password = ui::prompt_new_password()?;
    info!("generating 2048-bit identity, this can take a moment");
    let pair = store.create(&password)?;
    ui::print_green("Account created!\n");
    Ok(pair)
}
