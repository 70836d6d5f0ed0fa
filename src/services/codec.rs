use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;
const IV_HEX_LEN: usize = IV_LEN * 2;

/// Attendee details captured by value when the code is issued. Later edits
/// to the attendee record do not change codes already printed on QR images;
/// re-issuing the code is the only way to refresh the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub document_id: String,
    pub phone: Option<String>,
}

/// Decoded payload of a redemption code. Never persisted; always derived by
/// decoding the opaque string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionCredential {
    pub ticket_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub attendee: AttendeeSnapshot,
}

/// Encrypts and decrypts self-contained redemption credentials.
///
/// Wire format: `hex(16-byte IV) || hex(AES-256-CBC ciphertext)` over the
/// canonical JSON of [`RedemptionCredential`]. Decoding needs no network or
/// database access, which is what allows entry points to validate offline.
///
/// The format carries no authentication tag. That is a known weakness kept
/// for compatibility with codes already issued on physical tickets; moving
/// to an AEAD construction is a breaking wire-format change that requires an
/// explicit migration.
#[derive(Clone)]
pub struct RedemptionCodec {
    key: [u8; 32],
}

impl RedemptionCodec {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn encode(&self, credential: &RedemptionCredential) -> Result<String, AppError> {
        let plaintext = serde_json::to_string(credential).map_err(|e| {
            AppError::InternalServerError(format!("Failed to serialize credential: {e}"))
        })?;

        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!("{}{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    pub fn decode(&self, code: &str) -> Result<RedemptionCredential, AppError> {
        // Hex is ASCII by definition; rejecting other input up front also
        // keeps the byte-index splits below on char boundaries.
        if !code.is_ascii() {
            return Err(AppError::DecodeError("non-ASCII code".to_string()));
        }
        if code.len() <= IV_HEX_LEN {
            return Err(AppError::DecodeError("code too short".to_string()));
        }

        let iv = hex::decode(&code[..IV_HEX_LEN])
            .map_err(|e| AppError::DecodeError(format!("malformed IV hex: {e}")))?;
        let ciphertext = hex::decode(&code[IV_HEX_LEN..])
            .map_err(|e| AppError::DecodeError(format!("malformed ciphertext hex: {e}")))?;

        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| AppError::DecodeError("bad IV length".to_string()))?;

        let plaintext = Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| AppError::DecodeError("cipher failure".to_string()))?;

        let credential: RedemptionCredential = serde_json::from_slice(&plaintext)
            .map_err(|e| AppError::DecodeError(format!("invalid payload: {e}")))?;

        validate_credential(&credential)?;

        Ok(credential)
    }
}

fn validate_credential(credential: &RedemptionCredential) -> Result<(), AppError> {
    if credential.ticket_id <= 0 {
        return Err(AppError::DecodeError("non-positive ticket id".to_string()));
    }
    let attendee = &credential.attendee;
    if attendee.first_name.is_empty()
        || attendee.last_name.is_empty()
        || attendee.document_id.is_empty()
    {
        return Err(AppError::DecodeError("missing attendee fields".to_string()));
    }
    if !looks_like_email(&attendee.email) {
        return Err(AppError::DecodeError("malformed attendee email".to_string()));
    }
    Ok(())
}

pub(crate) fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}
