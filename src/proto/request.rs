use super::ZkError;
use crate::{Acl, Disposition};
use byteorder::{BigEndian, WriteBytesExt};
use std::borrow::Cow;
use std::convert::TryFrom;
use std::io::{self, Write};

/// A request body, addressed with an already resolved path.
#[derive(Debug)]
pub(crate) enum Request {
    GetData { path: String, watch: bool },
    Exists { path: String, watch: bool },
    GetChildren { path: String, watch: bool },
    GetAcl { path: String },
    Create {
        path: String,
        data: Cow<'static, [u8]>,
        acl: Cow<'static, [Acl]>,
        mode: Disposition,
    },
    Delete { path: String, version: i32 },
    SetData {
        path: String,
        data: Cow<'static, [u8]>,
        version: i32,
    },
    Check { path: String, version: i32 },
    SetAcl {
        path: String,
        acl: Cow<'static, [Acl]>,
        version: i32,
    },
    Multi(Vec<Request>),
    Auth { scheme: String, auth: Vec<u8> },
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[repr(i32)]
pub(crate) enum OpCode {
    Create = 1,
    Delete = 2,
    Exists = 3,
    GetData = 4,
    SetData = 5,
    GetAcl = 6,
    SetAcl = 7,
    GetChildren = 8,
    Check = 13,
    Multi = 14,
    Auth = 100,
}

impl TryFrom<i32> for OpCode {
    type Error = i32;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let opcode = match code {
            1 => OpCode::Create,
            2 => OpCode::Delete,
            3 => OpCode::Exists,
            4 => OpCode::GetData,
            5 => OpCode::SetData,
            6 => OpCode::GetAcl,
            7 => OpCode::SetAcl,
            8 => OpCode::GetChildren,
            13 => OpCode::Check,
            14 => OpCode::Multi,
            100 => OpCode::Auth,
            unknown => return Err(unknown),
        };
        Ok(opcode)
    }
}

/// Precedes every operation of a transaction, in requests and in replies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MultiHeader {
    NextOk(OpCode),
    NextErr(ZkError),
    Done,
}

pub(crate) trait WriteTo {
    fn write_to<W: Write>(&self, writer: W) -> io::Result<()>;
}

impl WriteTo for Acl {
    fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.perms.code())?;
        self.id.scheme.write_to(&mut writer)?;
        self.id.id.write_to(writer)
    }
}

impl WriteTo for MultiHeader {
    fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        // (type, done, err); unused slots are -1
        let (opcode, done, err) = match *self {
            MultiHeader::NextOk(opcode) => (opcode as i32, false, -1),
            MultiHeader::NextErr(err) => (-1, false, err as i32),
            MultiHeader::Done => (-1, true, -1),
        };
        writer.write_i32::<BigEndian>(opcode)?;
        writer.write_u8(done as u8)?;
        writer.write_i32::<BigEndian>(err)
    }
}

impl WriteTo for str {
    fn write_to<W: Write>(&self, writer: W) -> io::Result<()> {
        self.as_bytes().write_to(writer)
    }
}

impl WriteTo for [u8] {
    fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_i32::<BigEndian>(self.len() as i32)?;
        writer.write_all(self)
    }
}

pub(crate) fn write_list<W, T>(mut writer: W, items: &[T]) -> io::Result<()>
where
    T: WriteTo,
    W: Write,
{
    writer.write_i32::<BigEndian>(items.len() as i32)?;
    items.iter().try_for_each(|item| item.write_to(&mut writer))
}

impl WriteTo for Request {
    fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        match *self {
            Request::GetData { ref path, watch }
            | Request::Exists { ref path, watch }
            | Request::GetChildren { ref path, watch } => {
                path.write_to(&mut w)?;
                w.write_u8(watch as u8)
            }
            Request::GetAcl { ref path } => path.write_to(w),
            Request::Create {
                ref path,
                ref data,
                ref acl,
                mode,
            } => {
                path.write_to(&mut w)?;
                data.write_to(&mut w)?;
                write_list(&mut w, acl)?;
                w.write_i32::<BigEndian>(mode as i32)
            }
            Request::Delete { ref path, version } | Request::Check { ref path, version } => {
                path.write_to(&mut w)?;
                w.write_i32::<BigEndian>(version)
            }
            Request::SetData {
                ref path,
                ref data,
                version,
            } => {
                path.write_to(&mut w)?;
                data.write_to(&mut w)?;
                w.write_i32::<BigEndian>(version)
            }
            Request::SetAcl {
                ref path,
                ref acl,
                version,
            } => {
                path.write_to(&mut w)?;
                write_list(&mut w, acl)?;
                w.write_i32::<BigEndian>(version)
            }
            Request::Multi(ref ops) => {
                // one concrete writer type, or nested calls instantiate without end
                let w: &mut dyn Write = &mut w;
                for op in ops {
                    MultiHeader::NextOk(op.opcode()).write_to(&mut *w)?;
                    op.write_to(&mut *w)?;
                }
                MultiHeader::Done.write_to(w)
            }
            Request::Auth {
                ref scheme,
                ref auth,
            } => {
                // auth type; only 0 is defined
                w.write_i32::<BigEndian>(0)?;
                scheme.write_to(&mut w)?;
                auth.write_to(w)
            }
        }
    }
}

impl Request {
    pub(crate) fn opcode(&self) -> OpCode {
        match *self {
            Request::GetData { .. } => OpCode::GetData,
            Request::Exists { .. } => OpCode::Exists,
            Request::GetChildren { .. } => OpCode::GetChildren,
            Request::GetAcl { .. } => OpCode::GetAcl,
            Request::Create { .. } => OpCode::Create,
            Request::Delete { .. } => OpCode::Delete,
            Request::SetData { .. } => OpCode::SetData,
            Request::Check { .. } => OpCode::Check,
            Request::SetAcl { .. } => OpCode::SetAcl,
            Request::Multi(_) => OpCode::Multi,
            Request::Auth { .. } => OpCode::Auth,
        }
    }
}
