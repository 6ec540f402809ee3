//! The standard security handler: RC4 40/128, AES-128 (V4) and
//! AES-256 (V5 revision 6), as laid out in ISO 32000 §7.6.
//!
//! The write side derives the file key, emits the encryption
//! dictionary and filters every string and stream through a per-object
//! key. The read side authenticates a password against a parsed file
//! and decrypts the object table in place.

use std::cell::RefCell;

use aes::cipher::{
    block_padding::{NoPadding, Pkcs7},
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
};
use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

use crate::deserialize::ParsedPdf;
use crate::errors::{PdfError, Result};
use crate::object::{Dict, Obj, StringFormat};
use crate::utils::{rng_bytes, Rng};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Password padding string from ISO 32000-1 table 21
const PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

/// Which standard-security scheme to use
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncryptionMethod {
    Rc4_40,
    Rc4_128,
    Aes128,
    Aes256,
}

impl EncryptionMethod {
    fn key_len(self) -> usize {
        match self {
            EncryptionMethod::Rc4_40 => 5,
            EncryptionMethod::Rc4_128 | EncryptionMethod::Aes128 => 16,
            EncryptionMethod::Aes256 => 32,
        }
    }

    fn revision(self) -> u8 {
        match self {
            EncryptionMethod::Rc4_40 => 2,
            EncryptionMethod::Rc4_128 => 3,
            EncryptionMethod::Aes128 => 4,
            EncryptionMethod::Aes256 => 6,
        }
    }
}

/// User permission flags. Reserved bits are applied when the `/P`
/// value is computed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const PRINT: u32 = 1 << 2;
    pub const MODIFY: u32 = 1 << 3;
    pub const COPY: u32 = 1 << 4;
    pub const ANNOTATE: u32 = 1 << 5;
    pub const FILL_FORMS: u32 = 1 << 8;
    pub const EXTRACT: u32 = 1 << 9;
    pub const ASSEMBLE: u32 = 1 << 10;
    pub const PRINT_HIGH_RES: u32 = 1 << 11;

    pub fn all() -> Self {
        Permissions(
            Self::PRINT
                | Self::MODIFY
                | Self::COPY
                | Self::ANNOTATE
                | Self::FILL_FORMS
                | Self::EXTRACT
                | Self::ASSEMBLE
                | Self::PRINT_HIGH_RES,
        )
    }

    pub fn none() -> Self {
        Permissions(0)
    }

    /// The signed `/P` value: bits 1–2 zero, bits 7–8 and the unused
    /// high bits set
    pub fn p_value(self) -> i32 {
        (0xFFFF_F0C0u32 | (self.0 & 0x0000_0F3C)) as i32
    }
}

/// Encryption configuration passed to `Document::set_protection`
#[derive(Debug, Clone)]
pub struct Protection {
    pub method: EncryptionMethod,
    pub user_password: String,
    /// generated randomly when absent
    pub owner_password: Option<String>,
    pub permissions: Permissions,
}

/// Write-side state: file key plus the finished encryption dictionary
pub struct EncryptionState {
    method: EncryptionMethod,
    file_key: Vec<u8>,
    encrypt_metadata: bool,
    dict: Dict,
    rng: RefCell<Box<dyn Rng>>,
}

impl std::fmt::Debug for EncryptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionState")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl EncryptionState {
    /// Derives all values of the encryption dictionary. `file_id` is the
    /// first element of the trailer `/ID`, required for the RC4/AES-128
    /// key derivation.
    pub fn new(protection: &Protection, file_id: &[u8], mut rng: Box<dyn Rng>) -> Result<Self> {
        let method = protection.method;
        let owner_password = match &protection.owner_password {
            Some(p) => p.clone(),
            None => {
                // no owner password requested: 16 random bytes
                let bytes: [u8; 16] = rng_bytes(&mut *rng);
                bytes.iter().map(|b| format!("{:02x}", b)).collect()
            }
        };
        let p = protection.permissions.p_value();

        let mut dict = Dict::new();
        dict.set("Filter", Obj::name("Standard"));

        let (file_key, dict) = match method {
            EncryptionMethod::Rc4_40 | EncryptionMethod::Rc4_128 | EncryptionMethod::Aes128 => {
                let r = method.revision();
                let key_len = method.key_len();
                let o = compute_o(&owner_password, &protection.user_password, r, key_len);
                let file_key = compute_file_key(
                    &protection.user_password,
                    &o,
                    p,
                    file_id,
                    r,
                    key_len,
                    true,
                );
                let u = compute_u(&file_key, file_id, r);
                match method {
                    EncryptionMethod::Rc4_40 => {
                        dict.set("V", 1i64);
                        dict.set("R", 2i64);
                        dict.set("Length", 40i64);
                    }
                    EncryptionMethod::Rc4_128 => {
                        dict.set("V", 2i64);
                        dict.set("R", 3i64);
                        dict.set("Length", 128i64);
                    }
                    EncryptionMethod::Aes128 => {
                        dict.set("V", 4i64);
                        dict.set("R", 4i64);
                        dict.set("Length", 128i64);
                        let mut std_cf = Dict::new();
                        std_cf.set("CFM", Obj::name("AESV2"));
                        std_cf.set("AuthEvent", Obj::name("DocOpen"));
                        std_cf.set("Length", 16i64);
                        let mut cf = Dict::new();
                        cf.set("StdCF", std_cf);
                        dict.set("CF", cf);
                        dict.set("StmF", Obj::name("StdCF"));
                        dict.set("StrF", Obj::name("StdCF"));
                    }
                    EncryptionMethod::Aes256 => unreachable!(),
                }
                dict.set("O", Obj::String(o, StringFormat::Hexadecimal));
                dict.set("U", Obj::String(u, StringFormat::Hexadecimal));
                dict.set("P", p as i64);
                (file_key, dict)
            }
            EncryptionMethod::Aes256 => {
                // the file key never derives from a password in V5
                let file_key: [u8; 32] = rng_bytes(&mut *rng);
                let user_pw = protection.user_password.as_bytes();
                let owner_pw = owner_password.as_bytes();

                let validation_salt: [u8; 8] = rng_bytes(&mut *rng);
                let key_salt: [u8; 8] = rng_bytes(&mut *rng);
                let mut u = hash_r6(user_pw, &validation_salt, &[]).to_vec();
                u.extend_from_slice(&validation_salt);
                u.extend_from_slice(&key_salt);
                let ue = aes256_cbc_zero_iv_encrypt(
                    &hash_r6(user_pw, &key_salt, &[]),
                    &file_key,
                )?;

                let o_validation_salt: [u8; 8] = rng_bytes(&mut *rng);
                let o_key_salt: [u8; 8] = rng_bytes(&mut *rng);
                let mut o = hash_r6(owner_pw, &o_validation_salt, &u).to_vec();
                o.extend_from_slice(&o_validation_salt);
                o.extend_from_slice(&o_key_salt);
                let oe = aes256_cbc_zero_iv_encrypt(
                    &hash_r6(owner_pw, &o_key_salt, &u),
                    &file_key,
                )?;

                let mut perms_plain = [0u8; 16];
                perms_plain[0..4].copy_from_slice(&p.to_le_bytes());
                perms_plain[4..8].copy_from_slice(&[0xFF; 4]);
                perms_plain[8] = b'T'; // EncryptMetadata = true
                perms_plain[9] = b'a';
                perms_plain[10] = b'd';
                perms_plain[11] = b'b';
                let filler: [u8; 4] = rng_bytes(&mut *rng);
                perms_plain[12..16].copy_from_slice(&filler);
                let perms = aes256_ecb_encrypt(&file_key, &perms_plain)?;

                dict.set("V", 5i64);
                dict.set("R", 6i64);
                dict.set("Length", 256i64);
                let mut std_cf = Dict::new();
                std_cf.set("CFM", Obj::name("AESV3"));
                std_cf.set("AuthEvent", Obj::name("DocOpen"));
                std_cf.set("Length", 32i64);
                let mut cf = Dict::new();
                cf.set("StdCF", std_cf);
                dict.set("CF", cf);
                dict.set("StmF", Obj::name("StdCF"));
                dict.set("StrF", Obj::name("StdCF"));
                dict.set("O", Obj::String(o, StringFormat::Hexadecimal));
                dict.set("U", Obj::String(u, StringFormat::Hexadecimal));
                dict.set("OE", Obj::String(oe, StringFormat::Hexadecimal));
                dict.set("UE", Obj::String(ue, StringFormat::Hexadecimal));
                dict.set("P", p as i64);
                dict.set("Perms", Obj::String(perms, StringFormat::Hexadecimal));
                (file_key.to_vec(), dict)
            }
        };

        Ok(EncryptionState {
            method,
            file_key,
            encrypt_metadata: true,
            dict,
            rng: RefCell::new(rng),
        })
    }

    pub fn dict(&self) -> Dict {
        self.dict.clone()
    }

    pub fn method(&self) -> EncryptionMethod {
        self.method
    }

    /// Metadata streams stay plaintext when `EncryptMetadata` is false
    pub(crate) fn skip_stream(&self, dict: &Dict) -> bool {
        !self.encrypt_metadata
            && dict.get("Type").and_then(Obj::as_name) == Some("Metadata")
    }

    /// Encrypts one string or stream body with the per-object key
    pub(crate) fn encrypt_object_bytes(&self, obj_no: usize, gen: u16, data: &[u8]) -> Vec<u8> {
        let mut rng = self.rng.borrow_mut();
        match self.method {
            EncryptionMethod::Rc4_40 | EncryptionMethod::Rc4_128 => {
                let key = object_key(&self.file_key, obj_no, gen, false);
                rc4(&key, data)
            }
            EncryptionMethod::Aes128 => {
                let key = object_key(&self.file_key, obj_no, gen, true);
                let iv: [u8; 16] = rng_bytes(&mut **rng);
                aes_cbc_encrypt(&key, &iv, data)
            }
            EncryptionMethod::Aes256 => {
                let iv: [u8; 16] = rng_bytes(&mut **rng);
                aes_cbc_encrypt(&self.file_key, &iv, data)
            }
        }
    }
}

/// Read-side result of a successful authentication
#[derive(Debug, Clone)]
pub struct DecryptContext {
    pub method: EncryptionMethod,
    pub file_key: Vec<u8>,
    pub encrypt_metadata: bool,
    /// true when the owner password matched
    pub is_owner: bool,
}

impl DecryptContext {
    /// Decrypts one string or stream body
    pub fn decrypt_object_bytes(&self, obj_no: usize, gen: u16, data: &[u8]) -> Result<Vec<u8>> {
        match self.method {
            EncryptionMethod::Rc4_40 | EncryptionMethod::Rc4_128 => {
                let key = object_key(&self.file_key, obj_no, gen, false);
                Ok(rc4(&key, data))
            }
            EncryptionMethod::Aes128 => {
                let key = object_key(&self.file_key, obj_no, gen, true);
                aes_cbc_decrypt(&key, data)
            }
            EncryptionMethod::Aes256 => aes_cbc_decrypt(&self.file_key, data),
        }
    }
}

/// Tries the owner password first, then the user password, against the
/// encryption dictionary of a parsed file.
pub fn authenticate(parsed: &ParsedPdf, password: &str) -> Result<DecryptContext> {
    let enc = parsed
        .encrypt_dict()
        .ok_or_else(|| PdfError::PdfParse("file has no /Encrypt dictionary".to_string()))?;
    let filter = enc.get("Filter").and_then(Obj::as_name).unwrap_or("");
    if filter != "Standard" {
        return Err(PdfError::UnsupportedEncryptionMethod(filter.to_string()));
    }
    let v = enc.get("V").and_then(Obj::as_int).unwrap_or(0);
    let r = enc.get("R").and_then(Obj::as_int).unwrap_or(0);
    let o = enc
        .get("O")
        .and_then(Obj::as_string)
        .ok_or_else(|| PdfError::PdfParse("/Encrypt has no O entry".to_string()))?
        .to_vec();
    let u = enc
        .get("U")
        .and_then(Obj::as_string)
        .ok_or_else(|| PdfError::PdfParse("/Encrypt has no U entry".to_string()))?
        .to_vec();
    let p = enc.get("P").and_then(Obj::as_int).unwrap_or(-1) as i32;
    let encrypt_metadata = match enc.get("EncryptMetadata") {
        Some(Obj::Boolean(b)) => *b,
        _ => true,
    };

    match (v, r) {
        (1, 2) | (2, 3) | (4, 4) => {
            let key_len = match (v, r) {
                (1, 2) => 5,
                _ => (enc.get("Length").and_then(Obj::as_int).unwrap_or(128) / 8) as usize,
            };
            let method = match (v, r) {
                (1, 2) => EncryptionMethod::Rc4_40,
                (2, 3) => EncryptionMethod::Rc4_128,
                _ => EncryptionMethod::Aes128,
            };
            let file_id = parsed.file_id().unwrap_or_default();
            let r = r as u8;

            // user password path
            let check_user = |pw: &str| -> Option<Vec<u8>> {
                let key =
                    compute_file_key(pw, &o, p, &file_id, r, key_len, encrypt_metadata);
                let expected = compute_u(&key, &file_id, r);
                let matches = if r == 2 {
                    expected == u
                } else {
                    expected.get(..16) == u.get(..16)
                };
                matches.then_some(key)
            };

            // owner password decrypts O back into the user password
            let owner_key = {
                let mut digest = md5_once(&pad_password(password));
                if r >= 3 {
                    for _ in 0..50 {
                        digest = md5_once(&digest[..key_len]);
                    }
                }
                digest[..key_len].to_vec()
            };
            let mut user_pw_bytes = o.clone();
            if r == 2 {
                user_pw_bytes = rc4(&owner_key, &user_pw_bytes);
            } else {
                for i in (0..=19u8).rev() {
                    let k: Vec<u8> = owner_key.iter().map(|b| b ^ i).collect();
                    user_pw_bytes = rc4(&k, &user_pw_bytes);
                }
            }
            let recovered = unpad_password(&user_pw_bytes);
            if let Some(key) = check_user(&recovered) {
                return Ok(DecryptContext {
                    method,
                    file_key: key,
                    encrypt_metadata,
                    is_owner: true,
                });
            }
            if let Some(key) = check_user(password) {
                return Ok(DecryptContext {
                    method,
                    file_key: key,
                    encrypt_metadata,
                    is_owner: false,
                });
            }
            Err(PdfError::EncryptBadPassword)
        }
        (5, 5) | (5, 6) => {
            if o.len() < 48 || u.len() < 48 {
                return Err(PdfError::CipherParse("U/O entry too short".to_string()));
            }
            let pw = password.as_bytes();
            let ue = enc
                .get("UE")
                .and_then(Obj::as_string)
                .ok_or_else(|| PdfError::PdfParse("/Encrypt has no UE".to_string()))?;
            let oe = enc
                .get("OE")
                .and_then(Obj::as_string)
                .ok_or_else(|| PdfError::PdfParse("/Encrypt has no OE".to_string()))?;

            // owner first: hash over password + validation salt + full U
            let o_hash = hash_r6(pw, &o[32..40], &u[..48]);
            if o_hash == o[..32] {
                let ikey = hash_r6(pw, &o[40..48], &u[..48]);
                let file_key = aes256_cbc_zero_iv_decrypt(&ikey, oe)?;
                return Ok(DecryptContext {
                    method: EncryptionMethod::Aes256,
                    file_key,
                    encrypt_metadata,
                    is_owner: true,
                });
            }
            let u_hash = hash_r6(pw, &u[32..40], &[]);
            if u_hash == u[..32] {
                let ikey = hash_r6(pw, &u[40..48], &[]);
                let file_key = aes256_cbc_zero_iv_decrypt(&ikey, ue)?;
                return Ok(DecryptContext {
                    method: EncryptionMethod::Aes256,
                    file_key,
                    encrypt_metadata,
                    is_owner: false,
                });
            }
            Err(PdfError::EncryptBadPassword)
        }
        _ => Err(PdfError::UnsupportedEncryptionMethod(format!(
            "V={} R={}",
            v, r
        ))),
    }
}

/// Convenience wrapper that parses `data` first
pub fn authenticate_bytes(data: &[u8], password: &str) -> Result<DecryptContext> {
    let parsed = ParsedPdf::parse(data)?;
    authenticate(&parsed, password)
}

// ---------------------------------------------------------------------
// primitives
// ---------------------------------------------------------------------

/// Plain RC4 keystream cipher. Encryption and decryption are the same
/// operation.
pub(crate) fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s: [u8; 256] = [0; 256];
    for (i, v) in s.iter_mut().enumerate() {
        *v = i as u8;
    }
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j
            .wrapping_add(s[i])
            .wrapping_add(key[i % key.len()]);
        s.swap(i, j as usize);
    }
    let mut out = Vec::with_capacity(data.len());
    let (mut i, mut j) = (0u8, 0u8);
    for &b in data {
        i = i.wrapping_add(1);
        j = j.wrapping_add(s[i as usize]);
        s.swap(i as usize, j as usize);
        let k = s[(s[i as usize].wrapping_add(s[j as usize])) as usize];
        out.push(b ^ k);
    }
    out
}

fn md5_once(data: &[u8]) -> Vec<u8> {
    let mut h = Md5::new();
    h.update(data);
    h.finalize().to_vec()
}

fn pad_password(pw: &str) -> [u8; 32] {
    let bytes = pw.as_bytes();
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out[n..].copy_from_slice(&PAD[..32 - n]);
    out
}

/// Strips the padding appended by [`pad_password`]
fn unpad_password(padded: &[u8]) -> String {
    let mut end = padded.len().min(32);
    for i in 0..end {
        if padded[i..].starts_with(&PAD[..(end - i).min(PAD.len())]) {
            end = i;
            break;
        }
    }
    String::from_utf8_lossy(&padded[..end]).to_string()
}

/// Algorithm 3.3: the `/O` value for RC4 and AES-128 files
fn compute_o(owner_pw: &str, user_pw: &str, revision: u8, key_len: usize) -> Vec<u8> {
    let mut digest = md5_once(&pad_password(owner_pw));
    if revision >= 3 {
        for _ in 0..50 {
            digest = md5_once(&digest[..key_len]);
        }
    }
    let rc4_key = &digest[..key_len];
    let mut o = rc4(rc4_key, &pad_password(user_pw));
    if revision >= 3 {
        for i in 1..=19u8 {
            let k: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
            o = rc4(&k, &o);
        }
    }
    o
}

/// Algorithm 3.2: the file-level encryption key
fn compute_file_key(
    user_pw: &str,
    o: &[u8],
    p: i32,
    file_id: &[u8],
    revision: u8,
    key_len: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut h = Md5::new();
    h.update(pad_password(user_pw));
    h.update(o);
    h.update(p.to_le_bytes());
    h.update(file_id);
    if revision >= 4 && !encrypt_metadata {
        h.update([0xFF; 4]);
    }
    let mut digest = h.finalize().to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            digest = md5_once(&digest[..key_len]);
        }
    }
    digest[..key_len].to_vec()
}

/// Algorithms 3.4/3.5: the `/U` value
fn compute_u(file_key: &[u8], file_id: &[u8], revision: u8) -> Vec<u8> {
    if revision == 2 {
        return rc4(file_key, &PAD);
    }
    let mut h = Md5::new();
    h.update(PAD);
    h.update(file_id);
    let digest = h.finalize();
    let mut u = rc4(file_key, &digest);
    for i in 1..=19u8 {
        let k: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        u = rc4(&k, &u);
    }
    u.extend_from_slice(&[0u8; 16]);
    u
}

/// Per-object key: MD5 over file key, object number (3 bytes LE),
/// generation (2 bytes LE) and, for AES, the `sAlT` marker
fn object_key(file_key: &[u8], obj_no: usize, gen: u16, aes: bool) -> Vec<u8> {
    let mut h = Md5::new();
    h.update(file_key);
    let no = obj_no as u32;
    h.update(&no.to_le_bytes()[..3]);
    h.update(gen.to_le_bytes());
    if aes {
        h.update(b"sAlT");
    }
    let digest = h.finalize();
    let len = (file_key.len() + 5).min(16);
    digest[..len].to_vec()
}

/// The hardened hash of ISO 32000-2 algorithm 2.B (revision 6)
fn hash_r6(password: &[u8], salt: &[u8], udata: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(password);
    h.update(salt);
    h.update(udata);
    let mut k: Vec<u8> = h.finalize().to_vec();

    let mut i = 0usize;
    loop {
        let mut k1 = Vec::with_capacity(64 * (password.len() + k.len() + udata.len()));
        for _ in 0..64 {
            k1.extend_from_slice(password);
            k1.extend_from_slice(&k);
            k1.extend_from_slice(udata);
        }
        // k1 length is a multiple of 64, so NoPadding is always valid;
        // k is a SHA digest, so the 16-byte key/iv splits always exist
        let e = match Aes128CbcEnc::new_from_slices(&k[..16], &k[16..32]) {
            Ok(cipher) => cipher.encrypt_padded_vec_mut::<NoPadding>(&k1),
            Err(_) => return [0u8; 32],
        };
        let sum: u32 = e[..16].iter().map(|b| *b as u32).sum();
        k = match sum % 3 {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };
        i += 1;
        if i >= 64 && (*e.last().unwrap_or(&0) as usize) <= i - 32 {
            break;
        }
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    out
}

/// AES-CBC with a random IV prepended to the ciphertext, PKCS#7 padded
fn aes_cbc_encrypt(key: &[u8], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut out = iv.to_vec();
    let ct = match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
        _ => Aes256CbcEnc::new_from_slices(key, iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(data)),
    };
    out.extend_from_slice(&ct.unwrap_or_default());
    out
}

fn aes_cbc_decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 16 || (data.len() - 16) % 16 != 0 {
        return Err(PdfError::CipherParse(format!(
            "AES ciphertext length {} invalid",
            data.len()
        )));
    }
    let (iv, ct) = data.split_at(16);
    let result = match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| PdfError::CipherParse("bad AES key length".to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ct),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| PdfError::CipherParse("bad AES key length".to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(ct),
        n => {
            return Err(PdfError::CipherParse(format!("bad AES key length {}", n)));
        }
    };
    result.map_err(|_| PdfError::CipherParse("bad PKCS#7 padding".to_string()))
}

/// UE/OE encryption: AES-256-CBC with a zero IV and no padding
fn aes256_cbc_zero_iv_encrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 16 != 0 {
        return Err(PdfError::CipherParse(
            "zero-IV payload must be block aligned".to_string(),
        ));
    }
    let iv = [0u8; 16];
    Ok(Aes256CbcEnc::new(key.into(), (&iv).into()).encrypt_padded_vec_mut::<NoPadding>(data))
}

fn aes256_cbc_zero_iv_decrypt(key: &[u8; 32], data: &[u8]) -> Result<Vec<u8>> {
    if data.len() % 16 != 0 || data.is_empty() {
        return Err(PdfError::CipherParse(
            "zero-IV ciphertext must be block aligned".to_string(),
        ));
    }
    let iv = [0u8; 16];
    Aes256CbcDec::new(key.into(), (&iv).into())
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| PdfError::CipherParse("zero-IV decrypt failed".to_string()))
}

/// `/Perms` encryption: AES-256-ECB over one block
fn aes256_ecb_encrypt(key: &[u8], block16: &[u8; 16]) -> Result<Vec<u8>> {
    use aes::cipher::generic_array::GenericArray;
    let cipher = aes::Aes256::new_from_slice(key)
        .map_err(|_| PdfError::CipherParse("bad AES-256 key length".to_string()))?;
    let mut block = GenericArray::clone_from_slice(block16);
    cipher.encrypt_block(&mut block);
    Ok(block.to_vec())
}

/// Decrypts `/Perms` and verifies the `adb` marker against `P`
pub fn verify_perms(file_key: &[u8], perms: &[u8], p: i32) -> Result<bool> {
    use aes::cipher::generic_array::GenericArray;
    if perms.len() < 16 {
        return Err(PdfError::CipherParse("/Perms too short".to_string()));
    }
    let cipher = aes::Aes256::new_from_slice(file_key)
        .map_err(|_| PdfError::CipherParse("bad AES-256 key length".to_string()))?;
    let mut block = GenericArray::clone_from_slice(&perms[..16]);
    cipher.decrypt_block(&mut block);
    Ok(&block[9..12] == b"adb" && i32::from_le_bytes([block[0], block[1], block[2], block[3]]) == p)
}

/// Walks the object table and replaces every encrypted string and
/// stream with its plaintext. The `/Encrypt` entry is dropped from the
/// trailer, so a following write produces an unprotected file.
pub fn decrypt_document(parsed: &mut ParsedPdf, ctx: &DecryptContext) -> Result<()> {
    let encrypt_ref = parsed.encrypt_ref();
    let object_numbers: Vec<(u32, u16)> = parsed.object_numbers();
    for (no, gen) in object_numbers {
        if Some(no) == encrypt_ref {
            continue;
        }
        let Some(obj) = parsed.object_mut(no) else {
            continue;
        };
        decrypt_obj(obj, ctx, no as usize, gen)?;
    }
    parsed.trailer.remove("Encrypt");
    Ok(())
}

fn decrypt_obj(obj: &mut Obj, ctx: &DecryptContext, no: usize, gen: u16) -> Result<()> {
    match obj {
        Obj::String(bytes, _) => {
            *bytes = ctx.decrypt_object_bytes(no, gen, bytes)?;
        }
        Obj::Array(items) => {
            for item in items {
                decrypt_obj(item, ctx, no, gen)?;
            }
        }
        Obj::Dictionary(dict) => {
            for (_, v) in dict.iter_mut() {
                decrypt_obj(v, ctx, no, gen)?;
            }
        }
        Obj::Stream(stream) => {
            let is_metadata =
                stream.dict.get("Type").and_then(Obj::as_name) == Some("Metadata");
            if !(is_metadata && !ctx.encrypt_metadata) {
                stream.content = ctx.decrypt_object_bytes(no, gen, &stream.content)?;
            }
            let mut d = std::mem::take(&mut stream.dict);
            for (_, v) in d.iter_mut() {
                decrypt_obj(v, ctx, no, gen)?;
            }
            stream.dict = d;
        }
        _ => {}
    }
    Ok(())
}

/// Builds a default (owner-generated) state for tests and callers that
/// only need a user password.
pub fn protection(method: EncryptionMethod, user: &str, owner: &str) -> Protection {
    Protection {
        method,
        user_password: user.to_string(),
        owner_password: if owner.is_empty() {
            None
        } else {
            Some(owner.to_string())
        },
        permissions: Permissions::all(),
    }
}
