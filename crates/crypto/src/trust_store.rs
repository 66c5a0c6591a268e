//! Trust store (C1): the client's on-disk identity -- shared secret, trust
//! anchors, RSA key pair, and connected-device secrets -- plus the JWT
//! client-assertion builder used to authenticate against the policy server.
//!
//! The on-disk container is a signed JSON object (§4.1). The signature is
//! an HMAC-SHA256 over the literal concatenation of the container's fields,
//! keyed by a password-derived key; load hard-fails if it doesn't match.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncryptedPrivateKeyInfo, LineEnding};
use rand::rngs::OsRng;
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Result, TrustStoreError};
use crate::telemetry::TrustStoreTelemetry;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

const PBKDF2_ROUNDS: u32 = 1000;
const DERIVED_KEY_LEN: usize = 16;
const ZERO_IV: [u8; 16] = [0u8; 16];
const ASSERTION_AUDIENCE: &str = "oracle/iot/oauth2/token";
const ASSERTION_LIFETIME_MS: i64 = 900_000;

/// Hash algorithm selectable for signing calls. The formats in §4.1 only
/// ever ask for SHA-256, so that's the only variant; kept as an enum
/// rather than hard-coded so a future algorithm doesn't need a new method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureHash {
    Sha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionAlgorithm {
    Hs256,
    Rs256,
}

struct KeyPair {
    private_key: RsaPrivateKey,
    public_key_pem: String,
}

/// The client's trust store: shared secret, trust anchors, optional key
/// pair, and the per-device secrets shared with connected peripherals.
pub struct TrustStore {
    client_id: String,
    server_host: String,
    server_port: u16,
    server_scheme: String,
    shared_secret: Zeroizing<Vec<u8>>,
    trust_anchors: Vec<String>,
    key_pair: Option<KeyPair>,
    connected_devices: BTreeMap<String, Zeroizing<Vec<u8>>>,
    endpoint_id: Option<String>,
    activation_certificate: Option<String>,
    password: Zeroizing<String>,
    telemetry: Option<Arc<dyn TrustStoreTelemetry>>,
}

#[derive(Serialize, Deserialize)]
struct StoreContainer {
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(rename = "serverHost")]
    server_host: String,
    #[serde(rename = "serverPort")]
    server_port: u16,
    #[serde(rename = "serverScheme")]
    server_scheme: String,
    #[serde(rename = "sharedSecret")]
    shared_secret: String,
    #[serde(rename = "trustAnchors")]
    trust_anchors: Vec<String>,
    #[serde(rename = "keyPair")]
    key_pair: Option<String>,
    #[serde(rename = "connectedDevices")]
    connected_devices: BTreeMap<String, String>,
    signature: String,
    #[serde(rename = "endpointId", skip_serializing_if = "Option::is_none")]
    endpoint_id: Option<String>,
    #[serde(
        rename = "activationCertificate",
        skip_serializing_if = "Option::is_none"
    )]
    activation_certificate: Option<String>,
}

impl TrustStore {
    /// Provisions a fresh, unactivated trust store. `trust_anchors` are PEM
    /// blocks; `connected_devices` maps hardware id to shared secret bytes.
    pub fn provision(
        client_id: impl Into<String>,
        server_host: impl Into<String>,
        server_port: u16,
        server_scheme: impl Into<String>,
        shared_secret: Vec<u8>,
        trust_anchors: Vec<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            server_host: server_host.into(),
            server_port,
            server_scheme: server_scheme.into(),
            shared_secret: Zeroizing::new(shared_secret),
            trust_anchors,
            key_pair: None,
            connected_devices: BTreeMap::new(),
            endpoint_id: None,
            activation_certificate: None,
            password: Zeroizing::new(password.into()),
            telemetry: None,
        }
    }

    /// Attaches a telemetry recorder; subsequent key-pair, signing, and
    /// save/load operations report through it.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TrustStoreTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn server_host(&self) -> &str {
        &self.server_host
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn server_scheme(&self) -> &str {
        &self.server_scheme
    }

    pub fn endpoint_id(&self) -> Option<&str> {
        self.endpoint_id.as_deref()
    }

    pub fn trust_anchors(&self) -> &[String] {
        &self.trust_anchors
    }

    pub fn connected_devices(&self) -> impl Iterator<Item = &String> {
        self.connected_devices.keys()
    }

    pub fn is_activated(&self) -> bool {
        self.endpoint_id.is_some()
    }

    fn derived_key(&self) -> Zeroizing<[u8; DERIVED_KEY_LEN]> {
        let mut out = [0u8; DERIVED_KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha1>(self.password.as_bytes(), b"", PBKDF2_ROUNDS, &mut out);
        Zeroizing::new(out)
    }

    /// Generates an RSA key pair of `bits` length. `algorithm` is currently
    /// only ever `"RSA"`; accepted as a parameter for parity with the
    /// server-side contract and rejected otherwise.
    pub fn generate_key_pair(&mut self, algorithm: &str, bits: usize) -> Result<()> {
        if !algorithm.eq_ignore_ascii_case("rsa") {
            return Err(TrustStoreError::UnsupportedAlgorithm(algorithm.to_string()));
        }
        let result = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| TrustStoreError::KeyGeneration(e.to_string()))
            .and_then(|private_key| {
                let public_key = RsaPublicKey::from(&private_key);
                let public_key_pem = public_key
                    .to_pkcs1_pem(LineEnding::LF)
                    .map_err(|e| TrustStoreError::KeyGeneration(e.to_string()))?;
                Ok(KeyPair {
                    private_key,
                    public_key_pem,
                })
            });
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_key_pair_generation(result.is_ok());
        }
        self.key_pair = Some(result?);
        Ok(())
    }

    /// Activates the store with a server-assigned `endpoint_id`. Idempotent
    /// when called again with identical arguments; any divergence is
    /// rejected with `AlreadyActivated` rather than silently overwritten.
    pub fn set_endpoint_credentials(
        &mut self,
        endpoint_id: impl Into<String>,
        pem_cert: Option<String>,
    ) -> Result<()> {
        let endpoint_id = endpoint_id.into();
        if let Some(existing) = &self.endpoint_id {
            if *existing == endpoint_id && self.activation_certificate == pem_cert {
                return Ok(());
            }
            return Err(TrustStoreError::AlreadyActivated);
        }
        self.endpoint_id = Some(endpoint_id);
        self.activation_certificate = pem_cert;
        Ok(())
    }

    /// Resets the store to its pre-activation state (§4.1 `reset()`): the
    /// endpoint identity, activation certificate, and key pair are cleared,
    /// but provisioning identity (client id, server, shared secret, trust
    /// anchors) survives since re-provisioning is a separate operation.
    pub fn reset(&mut self) {
        self.endpoint_id = None;
        self.activation_certificate = None;
        self.key_pair = None;
    }

    fn signing_subject(&self) -> &str {
        self.endpoint_id.as_deref().unwrap_or(&self.client_id)
    }

    pub fn sign_with_private_key(&self, data: &[u8], hash: SignatureHash) -> Result<Vec<u8>> {
        let SignatureHash::Sha256 = hash;
        let started = Instant::now();
        let result = (|| {
            let key_pair = self
                .key_pair
                .as_ref()
                .ok_or(TrustStoreError::MissingPrivateKey)?;
            let signing_key = SigningKey::<Sha256>::new(key_pair.private_key.clone());
            let signature = signing_key
                .try_sign(data)
                .map_err(|e| TrustStoreError::Signing(e.to_string()))?;
            Ok(signature.to_vec())
        })();
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_signing_operation(started.elapsed().as_nanos() as u64, result.is_ok());
        }
        result
    }

    pub fn sign_with_shared_secret(
        &self,
        data: &[u8],
        hash: SignatureHash,
        hardware_id: Option<&str>,
    ) -> Result<Vec<u8>> {
        let SignatureHash::Sha256 = hash;
        let started = Instant::now();
        let result = (|| {
            let secret: &[u8] = match hardware_id {
                Some(id) => self
                    .connected_devices
                    .get(id)
                    .map(|s| s.as_slice())
                    .ok_or_else(|| TrustStoreError::Malformed(format!("unknown device {id}")))?,
                None => self.shared_secret.as_slice(),
            };
            let mut mac = HmacSha256::new_from_slice(secret)
                .map_err(|e| TrustStoreError::Signing(e.to_string()))?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        })();
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_signing_operation(started.elapsed().as_nanos() as u64, result.is_ok());
        }
        result
    }

    /// Builds a JWT client assertion: `HS256` signed with the shared secret
    /// while unactivated, `RS256` signed with the private key once a key
    /// pair and endpoint identity exist (§4.1).
    pub fn build_client_assertion(&self, now_ms: i64) -> Result<String> {
        let algorithm = if self.is_activated() && self.key_pair.is_some() {
            AssertionAlgorithm::Rs256
        } else {
            AssertionAlgorithm::Hs256
        };
        let header = serde_json::json!({
            "typ": "JWT",
            "alg": match algorithm {
                AssertionAlgorithm::Hs256 => "HS256",
                AssertionAlgorithm::Rs256 => "RS256",
            },
        });
        let exp_seconds = (now_ms + ASSERTION_LIFETIME_MS) / 1000;
        let subject = self.signing_subject();
        let payload = serde_json::json!({
            "iss": subject,
            "sub": subject,
            "aud": ASSERTION_AUDIENCE,
            "exp": exp_seconds,
        });
        let header_b64 = base64_url_encode(&serde_json::to_vec(&header).expect("json"));
        let payload_b64 = base64_url_encode(&serde_json::to_vec(&payload).expect("json"));
        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature = match algorithm {
            AssertionAlgorithm::Hs256 => {
                self.sign_with_shared_secret(signing_input.as_bytes(), SignatureHash::Sha256, None)?
            }
            AssertionAlgorithm::Rs256 => {
                self.sign_with_private_key(signing_input.as_bytes(), SignatureHash::Sha256)?
            }
        };
        let signature_b64 = base64_url_encode(&signature);
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_assertion_built();
        }
        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Serializes the store, encrypting the shared secret and shrouding the
    /// private key under the provisioning password, and signs the result.
    pub fn save(&self) -> Result<Vec<u8>> {
        let key = self.derived_key();

        let shared_secret_hex = hex::encode(aes_cbc_encrypt(&key, &self.shared_secret)?);

        let key_pair_b64 = match &self.key_pair {
            Some(kp) => Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                shroud_private_key(&kp.private_key, self.password.as_bytes())?,
            )),
            None => None,
        };

        let connected_devices: BTreeMap<String, String> = self
            .connected_devices
            .iter()
            .map(|(id, secret)| {
                aes_cbc_encrypt(&key, secret).map(|enc| (id.clone(), hex::encode(enc)))
            })
            .collect::<Result<_>>()?;

        let trust_anchors_part =
            serde_json::to_string(&self.trust_anchors).expect("trust anchors serialize");
        let key_pair_part = key_pair_b64.clone().unwrap_or_else(|| "null".to_string());
        let connected_devices_part = if connected_devices.is_empty() {
            "{}".to_string()
        } else {
            serde_json::to_string(&connected_devices).expect("connected devices serialize")
        };

        let signature = compute_signature(
            &key,
            &self.client_id,
            &self.server_host,
            self.server_port,
            &self.server_scheme,
            &shared_secret_hex,
            &trust_anchors_part,
            &key_pair_part,
            &connected_devices_part,
        );

        let container = StoreContainer {
            client_id: self.client_id.clone(),
            server_host: self.server_host.clone(),
            server_port: self.server_port,
            server_scheme: self.server_scheme.clone(),
            shared_secret: shared_secret_hex,
            trust_anchors: self.trust_anchors.clone(),
            key_pair: key_pair_b64,
            connected_devices,
            signature: hex::encode(signature),
            endpoint_id: self.endpoint_id.clone(),
            activation_certificate: self.activation_certificate.clone(),
        };

        let encoded = serde_json::to_vec(&container)
            .map_err(|e| TrustStoreError::Malformed(e.to_string()))?;
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_save();
        }
        Ok(encoded)
    }

    /// Loads a store from its serialized bytes, rejecting it outright if
    /// the signature doesn't verify (invariant 6 / scenario S6).
    pub fn load(bytes: &[u8], password: impl Into<String>) -> Result<Self> {
        Self::load_with_telemetry(bytes, password, None)
    }

    /// Same as [`TrustStore::load`], reporting the HMAC verification
    /// outcome through `telemetry` when given.
    pub fn load_with_telemetry(
        bytes: &[u8],
        password: impl Into<String>,
        telemetry: Option<Arc<dyn TrustStoreTelemetry>>,
    ) -> Result<Self> {
        let container: StoreContainer = serde_json::from_slice(bytes)
            .map_err(|e| TrustStoreError::Malformed(e.to_string()))?;
        let password = Zeroizing::new(password.into());

        let mut key = [0u8; DERIVED_KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha1>(password.as_bytes(), b"", PBKDF2_ROUNDS, &mut key);

        let key_pair_part = container
            .key_pair
            .clone()
            .unwrap_or_else(|| "null".to_string());
        let connected_devices_part = if container.connected_devices.is_empty() {
            "{}".to_string()
        } else {
            serde_json::to_string(&container.connected_devices).expect("connected devices serialize")
        };
        let trust_anchors_part =
            serde_json::to_string(&container.trust_anchors).expect("trust anchors serialize");

        let expected = compute_signature(
            &key,
            &container.client_id,
            &container.server_host,
            container.server_port,
            &container.server_scheme,
            &container.shared_secret,
            &trust_anchors_part,
            &key_pair_part,
            &connected_devices_part,
        );
        let stored = hex::decode(&container.signature)
            .map_err(|_| TrustStoreError::Malformed("signature is not hex".to_string()))?;
        let hmac_valid = !stored.is_empty() && stored == expected;
        if let Some(telemetry) = &telemetry {
            telemetry.record_load(hmac_valid);
        }
        if stored.is_empty() {
            return Err(TrustStoreError::MissingSignature);
        }
        if stored != expected {
            return Err(TrustStoreError::SignatureMismatch);
        }

        let shared_secret_cipher = hex::decode(&container.shared_secret)
            .map_err(|_| TrustStoreError::Malformed("sharedSecret is not hex".to_string()))?;
        let shared_secret = Zeroizing::new(aes_cbc_decrypt(&key, &shared_secret_cipher)?);

        let mut connected_devices = BTreeMap::new();
        for (id, cipher_hex) in &container.connected_devices {
            let cipher = hex::decode(cipher_hex)
                .map_err(|_| TrustStoreError::Malformed(format!("device {id} secret is not hex")))?;
            connected_devices.insert(id.clone(), Zeroizing::new(aes_cbc_decrypt(&key, &cipher)?));
        }

        let key_pair = match &container.key_pair {
            Some(b64) => {
                let der = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)
                    .map_err(|_| TrustStoreError::Malformed("keyPair is not base64".to_string()))?;
                let private_key = unshroud_private_key(&der, password.as_bytes())?;
                let public_key_pem = RsaPublicKey::from(&private_key)
                    .to_pkcs1_pem(LineEnding::LF)
                    .map_err(|e| TrustStoreError::Malformed(e.to_string()))?;
                Some(KeyPair {
                    private_key,
                    public_key_pem,
                })
            }
            None => None,
        };

        Ok(Self {
            client_id: container.client_id,
            server_host: container.server_host,
            server_port: container.server_port,
            server_scheme: container.server_scheme,
            shared_secret,
            trust_anchors: container.trust_anchors,
            key_pair,
            connected_devices,
            endpoint_id: container.endpoint_id,
            activation_certificate: container.activation_certificate,
            password,
            telemetry,
        })
    }

    pub fn public_key_pem(&self) -> Option<&str> {
        self.key_pair.as_ref().map(|kp| kp.public_key_pem.as_str())
    }
}

#[allow(clippy::too_many_arguments)]
fn compute_signature(
    key: &[u8],
    client_id: &str,
    server_host: &str,
    server_port: u16,
    server_scheme: &str,
    shared_secret_hex: &str,
    trust_anchors_part: &str,
    key_pair_part: &str,
    connected_devices_part: &str,
) -> Vec<u8> {
    let concatenated = format!(
        "{client_id}{server_host}{server_port}{server_scheme}{shared_secret_hex}{trust_anchors_part}{key_pair_part}{connected_devices_part}"
    );
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(concatenated.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn aes_cbc_encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let encryptor = Aes128CbcEnc::new(key.into(), (&ZERO_IV).into());
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn aes_cbc_decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let decryptor = Aes128CbcDec::new(key.into(), (&ZERO_IV).into());
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| TrustStoreError::Encryption(e.to_string()))
}

/// Shrouds a private key as a PBES2-encrypted PKCS#8 `EncryptedPrivateKeyInfo`
/// blob -- the analog used in place of a full PKCS#12 `pkcs8ShroudedKeyBag`
/// (see the module-level note and DESIGN.md).
fn shroud_private_key(private_key: &RsaPrivateKey, password: &[u8]) -> Result<Vec<u8>> {
    let der = private_key
        .to_pkcs8_encrypted_der(&mut OsRng, password)
        .map_err(|e| TrustStoreError::Encryption(e.to_string()))?;
    Ok(der.as_bytes().to_vec())
}

fn unshroud_private_key(der: &[u8], password: &[u8]) -> Result<RsaPrivateKey> {
    let info = EncryptedPrivateKeyInfo::try_from(der)
        .map_err(|e| TrustStoreError::Malformed(e.to_string()))?;
    let doc = info
        .decrypt(password)
        .map_err(|e| TrustStoreError::Malformed(e.to_string()))?;
    RsaPrivateKey::from_pkcs8_der(doc.as_bytes())
        .map_err(|e| TrustStoreError::Malformed(e.to_string()))
}

fn base64_url_encode(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> TrustStore {
        TrustStore::provision("c", "h", 443, "https", b"s".to_vec(), Vec::new(), "pw")
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let store = fixture();
        let bytes = store.save().unwrap();
        let loaded = TrustStore::load(&bytes, "pw").unwrap();
        assert_eq!(loaded.client_id(), "c");
        assert_eq!(loaded.server_port(), 443);
        assert!(!loaded.is_activated());
    }

    #[test]
    fn single_byte_signature_tamper_is_rejected() {
        let store = fixture();
        let bytes = store.save().unwrap();
        let mut container: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let sig = container["signature"].as_str().unwrap().to_string();
        let mut chars: Vec<char> = sig.chars().collect();
        let flipped = if chars[0] == '0' { '1' } else { '0' };
        chars[0] = flipped;
        container["signature"] = serde_json::Value::String(chars.into_iter().collect());
        let tampered = serde_json::to_vec(&container).unwrap();
        assert!(matches!(
            TrustStore::load(&tampered, "pw"),
            Err(TrustStoreError::SignatureMismatch)
        ));
    }

    #[test]
    fn set_endpoint_credentials_is_idempotent_only_for_identical_args() {
        let mut store = fixture();
        store.set_endpoint_credentials("ep1", None).unwrap();
        assert!(store.set_endpoint_credentials("ep1", None).is_ok());
        assert!(matches!(
            store.set_endpoint_credentials("ep2", None),
            Err(TrustStoreError::AlreadyActivated)
        ));
    }

    #[test]
    fn unactivated_assertion_uses_hs256() {
        let store = fixture();
        let assertion = store.build_client_assertion(0).unwrap();
        let header_b64 = assertion.split('.').next().unwrap();
        let header = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, header_b64).unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
        assert_eq!(header["alg"], "HS256");
    }

    #[test]
    fn activated_assertion_with_key_pair_uses_rs256() {
        let mut store = fixture();
        store.generate_key_pair("RSA", 2048).unwrap();
        store.set_endpoint_credentials("ep1", None).unwrap();
        let assertion = store.build_client_assertion(0).unwrap();
        let header_b64 = assertion.split('.').next().unwrap();
        let header = base64::Engine::decode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, header_b64).unwrap();
        let header: serde_json::Value = serde_json::from_slice(&header).unwrap();
        assert_eq!(header["alg"], "RS256");
    }

    #[test]
    fn missing_private_key_rejects_rs256_signing() {
        let store = fixture();
        assert!(matches!(
            store.sign_with_private_key(b"data", SignatureHash::Sha256),
            Err(TrustStoreError::MissingPrivateKey)
        ));
    }

    #[test]
    fn reset_clears_activation_but_keeps_provisioning() {
        let mut store = fixture();
        store.set_endpoint_credentials("ep1", None).unwrap();
        store.reset();
        assert!(!store.is_activated());
        assert_eq!(store.client_id(), "c");
    }

    #[derive(Default)]
    struct RecordingTelemetry {
        key_pair_generations: std::sync::atomic::AtomicU64,
        signing_operations: std::sync::atomic::AtomicU64,
        assertions_built: std::sync::atomic::AtomicU64,
        saves: std::sync::atomic::AtomicU64,
        loads: std::sync::Mutex<Vec<bool>>,
    }

    impl TrustStoreTelemetry for RecordingTelemetry {
        fn record_key_pair_generation(&self, _success: bool) {
            self.key_pair_generations
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn record_signing_operation(&self, _duration_ns: u64, _success: bool) {
            self.signing_operations
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn record_assertion_built(&self) {
            self.assertions_built
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn record_save(&self) {
            self.saves.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        fn record_load(&self, hmac_valid: bool) {
            self.loads.lock().unwrap().push(hmac_valid);
        }
    }

    #[test]
    fn telemetry_records_key_pair_signing_assertion_and_save() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let mut store = TrustStore::provision("c", "h", 443, "https", b"s".to_vec(), Vec::new(), "pw")
            .with_telemetry(telemetry.clone());

        store.generate_key_pair("RSA", 2048).unwrap();
        store.set_endpoint_credentials("ep1", None).unwrap();
        store.build_client_assertion(0).unwrap();
        store.save().unwrap();

        assert_eq!(
            telemetry
                .key_pair_generations
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        assert!(
            telemetry
                .signing_operations
                .load(std::sync::atomic::Ordering::SeqCst)
                >= 1
        );
        assert_eq!(
            telemetry
                .assertions_built
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        assert_eq!(telemetry.saves.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn telemetry_records_load_hmac_outcome() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let store = fixture();
        let bytes = store.save().unwrap();

        TrustStore::load_with_telemetry(&bytes, "pw", Some(telemetry.clone())).unwrap();
        assert_eq!(telemetry.loads.lock().unwrap().as_slice(), &[true]);

        let mut container: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        container["signature"] = serde_json::Value::String("00".to_string());
        let tampered = serde_json::to_vec(&container).unwrap();
        assert!(
            TrustStore::load_with_telemetry(&tampered, "pw", Some(telemetry.clone())).is_err()
        );
        assert_eq!(
            telemetry.loads.lock().unwrap().as_slice(),
            &[true, false]
        );
    }
}
