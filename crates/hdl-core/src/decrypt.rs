//! The `PayloadDecryptor` trait.
//!
//! Cryptography is opaque to the importer: an encrypted payload goes in, the
//! plaintext batch comes out. When no key material is available the watcher
//! runs without a decryptor and treats encrypted payloads as plaintext.

use std::future::Future;

pub trait PayloadDecryptor: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Decrypt a whole payload. Failure is fatal for the artifact; no partial
  /// plaintext is ever returned.
  fn decrypt(
    &self,
    ciphertext: Vec<u8>,
  ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send + '_;
}
