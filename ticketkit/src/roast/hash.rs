//! Crack formats understood by hashcat and john.

use crate::{ticket::EncData, Enctype, Error, Result};
use std::str::FromStr;

const AES_CHECKSUM_SIZE: usize = 12;
const RC4_CHECKSUM_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashFormat {
    #[default]
    Hashcat,
    John,
}

impl FromStr for HashFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hashcat" => Ok(Self::Hashcat),
            "john" => Ok(Self::John),
            _ => Err(format!("{}: unknown hash format", s)),
        }
    }
}

pub fn asrep_hash(
    username: &str,
    realm: &str,
    enc_part: &EncData,
    format: HashFormat,
) -> Result<String> {
    let etype = enc_part.enctype;
    let (salt, cipher) = split_checksum(etype, &enc_part.ciphertext)?;
    let (salt, cipher) = (hex::encode(salt), hex::encode(cipher));
    Ok(match format {
        HashFormat::Hashcat => format!(
            "$krb5asrep${}${}@{}:{}${}",
            etype.0, username, realm, salt, cipher
        ),
        HashFormat::John => format!("$krb5asrep${}@{}:{}${}", username, realm, salt, cipher),
    })
}

pub fn tgs_hash(
    username: &str,
    realm: &str,
    service: &str,
    enc_part: &EncData,
    format: HashFormat,
) -> Result<String> {
    let etype = enc_part.enctype;
    let service = service.replace(':', "~");
    let (salt, cipher) = split_checksum(etype, &enc_part.ciphertext)?;
    let (salt, cipher) = (hex::encode(salt), hex::encode(cipher));
    Ok(match format {
        HashFormat::Hashcat if etype.is_aes_sha1() => format!(
            "$krb5tgs${}${}${}$*{}*${}${}",
            etype.0, username, realm, service, salt, cipher
        ),
        HashFormat::Hashcat => format!(
            "$krb5tgs${}$*{}${}${}*${}${}",
            etype.0, username, realm, service, salt, cipher
        ),
        HashFormat::John => format!(
            "$krb5tgs${}@{}${}:{}${}",
            username, realm, service, salt, cipher
        ),
    })
}

/// Separates the checksum from the ciphertext: AES SHA1 etypes append a 12
/// byte HMAC, the others lead with a 16 byte checksum.
fn split_checksum(etype: Enctype, cipher: &[u8]) -> Result<(&[u8], &[u8])> {
    let checksum_size = if etype.is_aes_sha1() {
        AES_CHECKSUM_SIZE
    } else {
        RC4_CHECKSUM_SIZE
    };
    if cipher.len() < checksum_size {
        return Err(Error::malformed(
            "encrypted part",
            format!(
                "{} byte ciphertext is shorter than the {} checksum",
                cipher.len(),
                etype
            ),
        ));
    }
    Ok(if etype.is_aes_sha1() {
        let (cipher, checksum) = cipher.split_at(cipher.len() - checksum_size);
        (checksum, cipher)
    } else {
        cipher.split_at(checksum_size)
    })
}
