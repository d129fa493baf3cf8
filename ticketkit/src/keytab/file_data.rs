use super::{Keytab, KeytabEntry};
use crate::{Enctype, Error, Keyblock, NameType, Principal, Result};
use nom::{
    bytes::complete::take,
    number::{
        complete::{i16, i32, u16, u32, u8},
        Endianness,
    },
};

const FILE_FIRST_BYTE: u8 = 5;
const WHAT: &str = "keytab";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormatVersion {
    V1 = 1,
    V2,
}

impl TryFrom<u8> for FileFormatVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            _ => Err(Error::malformed(
                WHAT,
                format!("unsupported format version {}", value),
            )),
        }
    }
}

impl FileFormatVersion {
    // Version 1 of the file format uses native byte order for integer
    // representations. Version 2 always uses big-endian byte order.
    fn endianness(self) -> Endianness {
        match self {
            Self::V1 => Endianness::Native,
            Self::V2 => Endianness::Big,
        }
    }
}

struct RecordReader<'a> {
    input: &'a [u8],
    endianness: Endianness,
}

macro_rules! read_int {
    ($fn:ident, $type:ident) => {
        fn $fn(&mut self, field: &str) -> Result<$type> {
            let (rest, value) = $type::<_, nom::error::Error<&[u8]>>(self.endianness)(self.input)
                .map_err(|_| short(field))?;
            self.input = rest;
            Ok(value)
        }
    };
}

fn short(field: &str) -> Error {
    Error::truncated(WHAT, format!("{} runs past the end of its record", field))
}

impl<'a> RecordReader<'a> {
    fn read_u8(&mut self, field: &str) -> Result<u8> {
        let (rest, value) =
            u8::<_, nom::error::Error<&[u8]>>(self.input).map_err(|_| short(field))?;
        self.input = rest;
        Ok(value)
    }

    read_int!(read_i16, i16);
    read_int!(read_u16, u16);
    read_int!(read_i32, i32);
    read_int!(read_u32, u32);

    fn read_bytes(&mut self, size: usize, field: &str) -> Result<&'a [u8]> {
        let (rest, value) = take::<_, _, nom::error::Error<&[u8]>>(size)(self.input)
            .map_err(|_| short(field))?;
        self.input = rest;
        Ok(value)
    }

    // data ::=
    //     length (16 bits)
    //     value (length bytes)
    fn read_data(&mut self, field: &str) -> Result<Vec<u8>> {
        let size = self.read_u16(field)? as usize;
        Ok(self.read_bytes(size, field)?.to_vec())
    }
}

// There are two versions of the file format used by the FILE keytab type.
// The first byte of the file always has the value 5, and the value of the
// second byte contains the version number (1 or 2).
//
// After the two-byte version indicator, the file contains a sequence of
// signed 32-bit record lengths followed by key records or holes. A positive
// record length indicates a valid key entry whose size is equal to or less
// than the record length. A negative length indicates a zero-filled hole
// whose size is the inverse of the length. A length of 0, or the end of the
// file, ends the sequence.
pub(super) fn parse(data: &[u8]) -> Result<Keytab> {
    let mut reader = RecordReader {
        input: data,
        endianness: Endianness::Big,
    };
    if reader.read_u8("format marker")? != FILE_FIRST_BYTE {
        return Err(Error::malformed(WHAT, "leading byte is not 0x05"));
    }
    let version = FileFormatVersion::try_from(reader.read_u8("format version")?)?;
    reader.endianness = version.endianness();

    let mut entries = vec![];
    while reader.input.len() >= 4 {
        let size = reader.read_i32("record length")?;
        match size {
            0 => break,
            i32::MIN => return Err(Error::malformed(WHAT, "hole length out of range")),
            size if size < 0 => {
                reader.read_bytes(size.unsigned_abs() as usize, "hole")?;
            }
            size => {
                let record = reader.read_bytes(size as usize, "record")?;
                let mut record = RecordReader {
                    input: record,
                    endianness: reader.endianness,
                };
                entries.push(read_entry(&mut record, version)?);
            }
        }
    }
    Ok(Keytab { version, entries })
}

// entry ::=
//     principal
//     timestamp (32 bits)
//     key version (8 bits)
//     enctype (16 bits)
//     key length (16 bits)
//     key contents
//     key version (32 bits) [in release 1.14 and later]
//
// The 32-bit key version overrides the 8-bit key version when at least 4
// bytes remain in the record and their value is non-zero.
fn read_entry(reader: &mut RecordReader, version: FileFormatVersion) -> Result<KeytabEntry> {
    let principal = read_principal(reader, version)?;
    let timestamp = reader.read_u32("timestamp")?;
    let mut vno = u32::from(reader.read_u8("key version")?);
    let enctype = Enctype(reader.read_i16("enctype")?.into());
    let key = Keyblock::new(enctype, reader.read_data("key")?);
    if reader.input.len() >= 4 {
        match reader.read_u32("key version")? {
            0 => {}
            vno32 => vno = vno32,
        }
    }
    Ok(KeytabEntry {
        principal,
        timestamp,
        vno,
        key,
    })
}

// principal ::=
//     count of components (16 bits) [includes realm in version 1]
//     realm (data)
//     component1 (data)
//     component2 (data)
//     ...
//     name type (32 bits) [omitted in version 1]
fn read_principal(reader: &mut RecordReader, version: FileFormatVersion) -> Result<Principal> {
    let mut component_count = reader.read_u16("principal")?;
    if version == FileFormatVersion::V1 {
        component_count = component_count
            .checked_sub(1)
            .ok_or_else(|| Error::malformed(WHAT, "principal has no realm"))?;
    }
    let realm = reader.read_data("realm")?;
    let components = (0..component_count)
        .map(|_| reader.read_data("component"))
        .collect::<Result<Vec<_>>>()?;
    let name_type = match version {
        FileFormatVersion::V1 => NameType::UNKNOWN,
        FileFormatVersion::V2 => NameType(reader.read_i32("name type")?),
    };
    Ok(Principal {
        realm,
        components,
        name_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(value: &[u8]) -> Vec<u8> {
        let mut out = (value.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(value);
        out
    }

    fn record(
        components: &[&str],
        vno8: u8,
        enctype: i16,
        key: &[u8],
        vno32: Option<u32>,
    ) -> Vec<u8> {
        let mut entry = (components.len() as u16).to_be_bytes().to_vec();
        entry.extend(data(b"CORP.LOCAL"));
        for component in components {
            entry.extend(data(component.as_bytes()));
        }
        entry.extend(1i32.to_be_bytes());
        entry.extend(1_700_000_000u32.to_be_bytes());
        entry.push(vno8);
        entry.extend(enctype.to_be_bytes());
        entry.extend(data(key));
        if let Some(vno32) = vno32 {
            entry.extend(vno32.to_be_bytes());
        }
        let mut out = (entry.len() as i32).to_be_bytes().to_vec();
        out.extend(entry);
        out
    }

    #[test]
    fn v2_entries_holes_and_wide_kvno() {
        let mut bytes = vec![0x05, 0x02];
        bytes.extend(record(&["svc_sql"], 3, 18, &[0x11; 32], None));
        bytes.extend((-6i32).to_be_bytes());
        bytes.extend([0; 6]);
        bytes.extend(record(&["HTTP", "web01.corp.local"], 255, 23, &[0x22; 16], Some(300)));
        bytes.extend(record(&["svc_old"], 7, 17, &[0x33; 16], Some(0)));
        bytes.extend(0i32.to_be_bytes());
        bytes.extend([0xff; 3]);

        let keytab = parse(&bytes).unwrap();
        assert_eq!(keytab.version, FileFormatVersion::V2);
        let listed: Vec<(String, u32, Enctype)> = keytab
            .entries
            .iter()
            .map(|entry| (entry.principal.to_string(), entry.vno, entry.key.enctype))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("svc_sql@CORP.LOCAL".to_owned(), 3, Enctype::AES256_CTS_HMAC_SHA1_96),
                ("HTTP/web01.corp.local@CORP.LOCAL".to_owned(), 300, Enctype::ARCFOUR_HMAC),
                ("svc_old@CORP.LOCAL".to_owned(), 7, Enctype::AES128_CTS_HMAC_SHA1_96),
            ]
        );
        assert_eq!(keytab.entries[0].key.contents, vec![0x11; 32]);
        assert_eq!(keytab.entries[1].principal.name_type, NameType::PRINCIPAL);
    }

    #[test]
    fn bad_header_and_short_records() {
        assert!(matches!(
            parse(&[0x06, 0x02]),
            Err(Error::MalformedFormat { .. })
        ));
        assert!(matches!(
            parse(&[0x05, 0x03]),
            Err(Error::MalformedFormat { .. })
        ));
        assert!(parse(&[0x05, 0x02]).unwrap().entries.is_empty());

        let mut bytes = vec![0x05, 0x02];
        let mut entry = record(&["svc_sql"], 3, 18, &[0x11; 32], None);
        entry.truncate(entry.len() - 8);
        bytes.extend(entry);
        assert!(matches!(parse(&bytes), Err(Error::TruncatedData { .. })));
    }
}
