// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use rand::rngs::OsRng;
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, Oaep, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use std::cmp::max;

/// Byte-wise xor of two slices, the shorter one is padded with zeroes.
fn xor(left: &[u8], right: &[u8]) -> Vec<u8> {
    let len = max(left.len(), right.len());
    (0..len)
        .map(|i| left.get(i).copied().unwrap_or(0) ^ right.get(i).copied().unwrap_or(0))
        .collect()
}

fn sha1_1(bytes: impl AsRef<[u8]>) -> [u8; 20] {
    Sha1::digest(bytes.as_ref()).into()
}

fn sha1_2(bytes1: impl AsRef<[u8]>, bytes2: impl AsRef<[u8]>) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(bytes1.as_ref());
    hasher.update(bytes2.as_ref());
    hasher.finalize().into()
}

fn sha256_1(bytes: impl AsRef<[u8]>) -> [u8; 32] {
    Sha256::digest(bytes.as_ref()).into()
}

fn sha256_2(bytes1: impl AsRef<[u8]>, bytes2: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes1.as_ref());
    hasher.update(bytes2.as_ref());
    hasher.finalize().into()
}

/// Scramble for the `mysql_native_password` plugin.
///
/// `SHA1(password) XOR SHA1(nonce || SHA1(SHA1(password)))`, where a single trailing
/// NUL byte is stripped from `nonce`. Returns `None` for an empty password.
pub fn scramble_native(nonce: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    if password.is_empty() {
        return None;
    }

    let nonce = match nonce.split_last() {
        Some((0x00, rest)) => rest,
        _ => nonce,
    };

    let h1 = sha1_1(password);
    let h3 = sha1_2(nonce, sha1_1(h1));
    Some(xor(&h1, &h3))
}

/// Scramble for the `caching_sha2_password` plugin.
///
/// `H1 XOR SHA256(nonce || H3)` where `H1 = SHA256(password)` and `H3` is `H1` hashed
/// twice more. Returns `None` for an empty password.
pub fn scramble_sha256(nonce: &[u8], password: &[u8]) -> Option<Vec<u8>> {
    if password.is_empty() {
        return None;
    }

    let h1 = sha256_1(password);
    let h3 = sha256_1(sha256_1(h1));
    let h4 = sha256_2(nonce, h3);
    Some(xor(&h1, &h4))
}

/// Encrypts `password` for caching_sha2 full authentication over an insecure channel.
///
/// The NUL-terminated password is xored with the (cycled) nonce and encrypted with
/// RSA-OAEP(SHA1) using the server's PEM encoded public key.
pub fn encrypt_password(password: &[u8], nonce: &[u8], pem: &[u8]) -> Result<Vec<u8>, String> {
    if nonce.is_empty() {
        return Err("empty nonce".into());
    }

    let mut data = password.to_vec();
    data.push(0x00);
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= nonce[i % nonce.len()];
    }

    let pem = std::str::from_utf8(pem).map_err(|e| e.to_string())?;
    let pem = pem.trim_end_matches('\0');
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| e.to_string())?;

    key.encrypt(&mut OsRng, Oaep::new::<Sha1>(), &data)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod test {
    use super::*;

    const NONCE: &[u8] = b"zQg4i6oNy6=rHN/>-b)A";

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|x| format!("{:02x}", x)).collect()
    }

    #[test]
    fn should_compute_scrambled_password() {
        assert_eq!(
            hex(&scramble_native(NONCE, b"password").unwrap()),
            "a5cb4b426675936a9d986a6084abbcaa9df482ba"
        );
        assert_eq!(
            hex(&scramble_sha256(NONCE, b"password").unwrap()),
            "96d59ff7c19194b4a590d759028ed998e28fda8a5f40b8cd843a20230112e5df"
        );
    }

    #[test]
    fn should_strip_trailing_nul_for_native_only() {
        let mut nonce = NONCE.to_vec();
        nonce.push(0);

        assert_eq!(
            scramble_native(&nonce, b"password"),
            scramble_native(NONCE, b"password")
        );
        assert_eq!(
            hex(&scramble_sha256(&nonce, b"password").unwrap()),
            "458ce35898deb876f37a1a41799833e35c6075b823e6c8bf7b0b2392640f63d9"
        );
    }

    #[test]
    fn should_not_scramble_empty_password() {
        assert_eq!(scramble_native(NONCE, b""), None);
        assert_eq!(scramble_sha256(NONCE, b""), None);
    }

    #[test]
    fn should_pad_xor_to_longer_operand() {
        assert_eq!(xor(&[0xff, 0x0f], &[0x0f]), vec![0xf0, 0x0f]);
        assert_eq!(xor(&[], &[1, 2]), vec![1, 2]);
    }

    #[test]
    fn should_reject_malformed_public_key() {
        assert!(encrypt_password(b"password", NONCE, b"not a key").is_err());
        assert!(encrypt_password(b"password", b"", b"").is_err());
    }
}
