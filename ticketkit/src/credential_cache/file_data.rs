use super::{Address, AuthData, Credential, CredentialCache, TicketTimes};
use crate::{Enctype, Error, Keyblock, NameType, Principal, Result};
use nom::{
    bytes::complete::take,
    number::{
        complete::{i32, u16, u32, u8},
        Endianness,
    },
};

const FILE_FIRST_BYTE: u8 = 5;
pub(super) const FCC_TAG_DELTATIME: u16 = 1;
const WHAT: &str = "credential cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileFormatVersion {
    V1 = 1,
    V2,
    V3,
    V4,
}

impl TryFrom<u8> for FileFormatVersion {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            4 => Ok(Self::V4),
            _ => Err(Error::malformed(
                WHAT,
                format!("unsupported format version {}", value),
            )),
        }
    }
}

impl FileFormatVersion {
    // Versions 1 and 2 of the file format use native byte order for integer
    // representations.
    // Versions 3 and 4 always use big-endian byte order.
    fn endianness(self) -> Endianness {
        match self {
            Self::V1 | Self::V2 => Endianness::Native,
            Self::V3 | Self::V4 => Endianness::Big,
        }
    }
}

/// One tag/value field of a version 4 header, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub tag: u16,
    pub value: Vec<u8>,
}

struct FileReader<'a> {
    input: &'a [u8],
    len: usize,
    endianness: Endianness,
}

macro_rules! read_int {
    ($fn:ident, $type:ident) => {
        fn $fn(&mut self, field: &str) -> Result<$type> {
            let (rest, value) = $type::<_, nom::error::Error<&[u8]>>(self.endianness)(self.input)
                .map_err(|_| self.short(field))?;
            self.input = rest;
            Ok(value)
        }
    };
}

impl<'a> FileReader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            len: input.len(),
            endianness: Endianness::Big,
        }
    }

    fn is_empty(&self) -> bool {
        self.input.is_empty()
    }

    fn offset(&self) -> usize {
        self.len - self.input.len()
    }

    fn short(&self, field: &str) -> Error {
        Error::truncated(
            WHAT,
            format!("{} at offset {} runs past the end of the data", field, self.offset()),
        )
    }

    fn read_u8(&mut self, field: &str) -> Result<u8> {
        let (rest, value) =
            u8::<_, nom::error::Error<&[u8]>>(self.input).map_err(|_| self.short(field))?;
        self.input = rest;
        Ok(value)
    }

    read_int!(read_u16, u16);
    read_int!(read_u32, u32);
    read_int!(read_i32, i32);

    fn read_bytes(&mut self, size: usize, field: &str) -> Result<&'a [u8]> {
        let (rest, value) = take::<_, _, nom::error::Error<&[u8]>>(size)(self.input)
            .map_err(|_| self.short(field))?;
        self.input = rest;
        Ok(value)
    }

    // data ::=
    //     length (32 bits)
    //     value (length bytes)
    fn read_data(&mut self, field: &str) -> Result<Vec<u8>> {
        let size = self.read_u32(field)? as usize;
        Ok(self.read_bytes(size, field)?.to_vec())
    }
}

// There are four versions of the file format used by the FILE credential
// cache type.
// The first byte of the file always has the value 5, and the value of the
// second byte contains the version number (1 through 4).
// After the two-byte version indicator, the file has three parts:
// - the header (in version 4 only),
// - the default principal name,
// - and a sequence of credentials.
pub(super) fn parse(data: &[u8]) -> Result<CredentialCache> {
    let mut reader = FileReader::new(data);
    if reader.read_u8("format marker")? != FILE_FIRST_BYTE {
        return Err(Error::malformed(WHAT, "leading byte is not 0x05"));
    }
    let version = FileFormatVersion::try_from(reader.read_u8("format version")?)?;
    reader.endianness = version.endianness();
    let headers = if version == FileFormatVersion::V4 {
        read_header(&mut reader)?
    } else {
        vec![]
    };
    let principal = read_principal(&mut reader, version, "default principal")?;
    // There is no count of credentials or marker at the end of the sequence
    // of credentials; the sequence ends when the file ends.
    let mut credentials = vec![];
    while !reader.is_empty() {
        credentials.push(read_credential(&mut reader, version)?);
    }
    Ok(CredentialCache {
        version,
        headers,
        principal,
        credentials,
    })
}

// The header begins with a 16-bit integer giving the length of the entire
// header, followed by a sequence of fields. Each field consists of a 16-bit
// tag, a 16-bit length, and a value of the given length.
fn read_header(reader: &mut FileReader) -> Result<Vec<HeaderField>> {
    let header_size = reader.read_u16("header length")? as usize;
    let header = reader.read_bytes(header_size, "header")?;
    let mut fields = FileReader {
        input: header,
        len: header.len(),
        endianness: reader.endianness,
    };
    let mut headers = vec![];
    while !fields.is_empty() {
        if fields.input.len() < 4 {
            return Err(Error::malformed(WHAT, "incomplete header field"));
        }
        let tag = fields.read_u16("header tag")?;
        let field_size = fields.read_u16("header field length")? as usize;
        if field_size > fields.input.len() {
            return Err(Error::malformed(
                WHAT,
                format!("header field {} overruns the header", tag),
            ));
        }
        let value = fields.read_bytes(field_size, "header field")?.to_vec();
        headers.push(HeaderField { tag, value });
    }
    Ok(headers)
}

// principal ::=
//     name type (32 bits) [omitted in version 1]
//     count of components (32 bits) [includes realm in version 1]
//     realm (data)
//     component1 (data)
//     component2 (data)
//     ...
fn read_principal(
    reader: &mut FileReader,
    version: FileFormatVersion,
    field: &str,
) -> Result<Principal> {
    let name_type = if version == FileFormatVersion::V1 {
        NameType::UNKNOWN
    } else {
        NameType(reader.read_i32(field)?)
    };
    let mut component_count = reader.read_u32(field)?;
    if version == FileFormatVersion::V1 {
        component_count = component_count
            .checked_sub(1)
            .ok_or_else(|| Error::malformed(WHAT, format!("{} has no realm", field)))?;
    }
    let realm = reader.read_data(field)?;
    let components = (0..component_count)
        .map(|_| reader.read_data(field))
        .collect::<Result<Vec<_>>>()?;
    Ok(Principal {
        realm,
        components,
        name_type,
    })
}

// credential ::=
//     client (principal)
//     server (principal)
//     keyblock (keyblock)
//     authtime (32 bits)
//     starttime (32 bits)
//     endtime (32 bits)
//     renew_till (32 bits)
//     is_skey (1 byte, 0 or 1)
//     ticket_flags (32 bits)
//     addresses (addresses)
//     authdata (authdata)
//     ticket (data)
//     second_ticket (data)
fn read_credential(reader: &mut FileReader, version: FileFormatVersion) -> Result<Credential> {
    let client = read_principal(reader, version, "client principal")?;
    let server = read_principal(reader, version, "server principal")?;
    let keyblock = read_keyblock(reader, version)?;
    let times = TicketTimes {
        authtime: reader.read_u32("authtime")?,
        starttime: reader.read_u32("starttime")?,
        endtime: reader.read_u32("endtime")?,
        renew_till: reader.read_u32("renew_till")?,
    };
    let is_skey = reader.read_u8("is_skey")? > 0;
    let ticket_flags = reader.read_i32("ticket flags")?;
    let addresses = read_tagged_list(reader, "addresses")?
        .into_iter()
        .map(|(addrtype, contents)| Address { addrtype, contents })
        .collect();
    let authdata = read_tagged_list(reader, "authdata")?
        .into_iter()
        .map(|(ad_type, contents)| AuthData { ad_type, contents })
        .collect();
    let ticket = reader.read_data("ticket")?;
    let second_ticket = reader.read_data("second ticket")?;
    Ok(Credential {
        client,
        server,
        keyblock,
        times,
        is_skey,
        ticket_flags,
        addresses,
        authdata,
        ticket,
        second_ticket,
    })
}

// keyblock ::=
//     enctype (16 bits) [repeated twice in version 3]
//     data
fn read_keyblock(reader: &mut FileReader, version: FileFormatVersion) -> Result<Keyblock> {
    let enctype = Enctype(reader.read_u16("keyblock enctype")? as i16 as i32);
    if version == FileFormatVersion::V3 {
        reader.read_u16("keyblock enctype")?;
    }
    let contents = reader.read_data("keyblock")?;
    Ok(Keyblock { enctype, contents })
}

// addresses ::= count (32 bits) address1 address2 ...
// address ::= addrtype (16 bits) data
// authdata uses the same layout with ad_type in place of addrtype.
fn read_tagged_list(reader: &mut FileReader, field: &str) -> Result<Vec<(u16, Vec<u8>)>> {
    let count = reader.read_u32(field)?;
    (0..count)
        .map(|_| -> Result<(u16, Vec<u8>)> {
            Ok((reader.read_u16(field)?, reader.read_data(field)?))
        })
        .collect()
}

struct FileWriter {
    buf: Vec<u8>,
    endianness: Endianness,
}

macro_rules! write_int {
    ($fn:ident, $type:ident) => {
        fn $fn(&mut self, value: $type) {
            let bytes = match self.endianness {
                Endianness::Big => value.to_be_bytes(),
                Endianness::Little => value.to_le_bytes(),
                Endianness::Native => value.to_ne_bytes(),
            };
            self.buf.extend_from_slice(&bytes);
        }
    };
}

impl FileWriter {
    write_int!(write_u16, u16);
    write_int!(write_u32, u32);
    write_int!(write_i32, i32);

    fn write_data(&mut self, data: &[u8]) {
        self.write_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
    }

    fn write_principal(&mut self, principal: &Principal, version: FileFormatVersion) {
        let mut count = principal.components.len() as u32;
        if version == FileFormatVersion::V1 {
            count += 1;
        } else {
            self.write_i32(principal.name_type.0);
        }
        self.write_u32(count);
        self.write_data(&principal.realm);
        for component in &principal.components {
            self.write_data(component);
        }
    }

    fn write_credential(&mut self, credential: &Credential, version: FileFormatVersion) {
        self.write_principal(&credential.client, version);
        self.write_principal(&credential.server, version);
        let enctype = credential.keyblock.enctype.0 as u16;
        self.write_u16(enctype);
        if version == FileFormatVersion::V3 {
            self.write_u16(enctype);
        }
        self.write_data(&credential.keyblock.contents);
        let times = &credential.times;
        for time in [times.authtime, times.starttime, times.endtime, times.renew_till] {
            self.write_u32(time);
        }
        self.buf.push(credential.is_skey.into());
        self.write_i32(credential.ticket_flags);
        self.write_u32(credential.addresses.len() as u32);
        for address in &credential.addresses {
            self.write_u16(address.addrtype);
            self.write_data(&address.contents);
        }
        self.write_u32(credential.authdata.len() as u32);
        for authdata in &credential.authdata {
            self.write_u16(authdata.ad_type);
            self.write_data(&authdata.contents);
        }
        self.write_data(&credential.ticket);
        self.write_data(&credential.second_ticket);
    }
}

pub(super) fn serialize(cache: &CredentialCache) -> Vec<u8> {
    let version = cache.version;
    let mut writer = FileWriter {
        buf: vec![FILE_FIRST_BYTE, version as u8],
        endianness: version.endianness(),
    };
    if version == FileFormatVersion::V4 {
        let header_size: usize = cache.headers.iter().map(|field| 4 + field.value.len()).sum();
        writer.write_u16(header_size as u16);
        for field in &cache.headers {
            writer.write_u16(field.tag);
            writer.write_u16(field.value.len() as u16);
            writer.buf.extend_from_slice(&field.value);
        }
    }
    writer.write_principal(&cache.principal, version);
    for credential in &cache.credentials {
        writer.write_credential(credential, version);
    }
    writer.buf
}
