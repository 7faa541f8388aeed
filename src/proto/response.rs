use super::request::{MultiHeader, OpCode};
use super::ZkError;
use crate::{Acl, Id, Permission, Stat};
use byteorder::{BigEndian, ReadBytesExt};
use std::convert::TryFrom;
use std::io::{self, Read};

#[derive(Debug, PartialEq)]
pub(crate) enum Response {
    Stat(Stat),
    GetData { bytes: Vec<u8>, stat: Stat },
    GetAcl { acl: Vec<Acl>, stat: Stat },
    Empty,
    Strings(Vec<String>),
    String(String),
    Multi(Vec<Result<Response, ZkError>>),
}

pub(crate) trait ReadFrom: Sized {
    fn read_from<R: Read>(read: &mut R) -> io::Result<Self>;
}

impl ReadFrom for Vec<String> {
    fn read_from<R: Read>(read: &mut R) -> io::Result<Self> {
        let len = read.read_i32::<BigEndian>()?;
        // the count is untrusted; let the items themselves prove it
        let mut items = Vec::new();
        for _ in 0..len {
            items.push(read.read_string()?);
        }
        Ok(items)
    }
}

impl ReadFrom for Stat {
    fn read_from<R: Read>(read: &mut R) -> io::Result<Stat> {
        Ok(Stat {
            czxid: read.read_i64::<BigEndian>()?,
            mzxid: read.read_i64::<BigEndian>()?,
            ctime: read.read_i64::<BigEndian>()?,
            mtime: read.read_i64::<BigEndian>()?,
            version: read.read_i32::<BigEndian>()?,
            cversion: read.read_i32::<BigEndian>()?,
            aversion: read.read_i32::<BigEndian>()?,
            ephemeral_owner: read.read_i64::<BigEndian>()?,
            data_length: read.read_i32::<BigEndian>()?,
            num_children: read.read_i32::<BigEndian>()?,
            pzxid: read.read_i64::<BigEndian>()?,
        })
    }
}

impl ReadFrom for Vec<Acl> {
    fn read_from<R: Read>(read: &mut R) -> io::Result<Self> {
        let len = read.read_i32::<BigEndian>()?;
        let mut items = Vec::new();
        for _ in 0..len {
            let perms = Permission::from_raw(read.read_u32::<BigEndian>()?);
            let scheme = read.read_string()?;
            let id = read.read_string()?;
            items.push(Acl::new(Id::new(scheme, id), perms));
        }
        Ok(items)
    }
}

impl ReadFrom for MultiHeader {
    fn read_from<R: Read>(read: &mut R) -> io::Result<Self> {
        let opcode = read.read_i32::<BigEndian>()?;
        let done = read.read_u8()? != 0;
        let err = read.read_i32::<BigEndian>()?;
        if done {
            Ok(MultiHeader::Done)
        } else if opcode == -1 {
            ZkError::try_from(err)
                .map(MultiHeader::NextErr)
                .map_err(|code| invalid(format!("unknown error code {} in transaction", code)))
        } else {
            OpCode::try_from(opcode)
                .map(MultiHeader::NextOk)
                .map_err(|code| invalid(format!("unknown opcode {} in transaction", code)))
        }
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

pub(crate) trait BufferReader: Read {
    fn read_buffer(&mut self) -> io::Result<Vec<u8>>;
}

impl<R: Read> BufferReader for R {
    fn read_buffer(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_i32::<BigEndian>()?;
        let len = if len < 0 { 0 } else { len as usize };
        let mut buf = Vec::new();
        Read::take(&mut *self, len as u64).read_to_end(&mut buf)?;
        if buf.len() < len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(buf)
    }
}

pub(crate) trait StringReader: Read {
    fn read_string(&mut self) -> io::Result<String>;
}

impl<R: Read> StringReader for R {
    fn read_string(&mut self) -> io::Result<String> {
        let raw = self.read_buffer()?;
        String::from_utf8(raw).map_err(|e| invalid(e.to_string()))
    }
}

impl Response {
    pub(crate) fn parse(opcode: OpCode, reader: &mut &[u8]) -> Result<Self, failure::Error> {
        match opcode {
            OpCode::Exists | OpCode::SetData | OpCode::SetAcl | OpCode::Check => {
                Ok(Response::Stat(Stat::read_from(reader)?))
            }
            OpCode::GetData => Ok(Response::GetData {
                bytes: reader.read_buffer()?,
                stat: Stat::read_from(reader)?,
            }),
            OpCode::GetAcl => Ok(Response::GetAcl {
                acl: Vec::<Acl>::read_from(reader)?,
                stat: Stat::read_from(reader)?,
            }),
            OpCode::Delete | OpCode::Auth => Ok(Response::Empty),
            OpCode::Create => Ok(Response::String(reader.read_string()?)),
            OpCode::GetChildren => Ok(Response::Strings(Vec::<String>::read_from(reader)?)),
            OpCode::Multi => {
                let mut responses = Vec::new();
                loop {
                    match MultiHeader::read_from(reader)? {
                        MultiHeader::NextOk(opcode) => {
                            responses.push(Ok(Response::parse(opcode, reader)?));
                        }
                        MultiHeader::NextErr(err) => {
                            // the body of an error entry repeats the code
                            reader.read_i32::<BigEndian>()?;
                            responses.push(Err(err));
                        }
                        MultiHeader::Done => break,
                    }
                }
                Ok(Response::Multi(responses))
            }
        }
    }
}
