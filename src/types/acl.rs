use once_cell::sync::Lazy;
use std::fmt;
use std::ops;

/// Describes the ability of a user to perform a certain action.
///
/// Permissions can be mixed together like integers with `|` and `&`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Permission(u32);

impl Permission {
    /// No permissions are set (server could have been configured without ACL support).
    pub const NONE: Permission = Permission(0b00000);

    /// You can access the data of a node and can list its children.
    pub const READ: Permission = Permission(0b00001);

    /// You can set the data of a node.
    pub const WRITE: Permission = Permission(0b00010);

    /// You can create a child node.
    pub const CREATE: Permission = Permission(0b00100);

    /// You can delete a child node (but not necessarily this one).
    pub const DELETE: Permission = Permission(0b01000);

    /// You can alter permissions on this node.
    pub const ADMIN: Permission = Permission(0b10000);

    /// You can do anything.
    pub const ALL: Permission = Permission(0b11111);

    /// Extract a permission value from raw bits.
    pub(crate) fn from_raw(bits: u32) -> Permission {
        Permission(bits & Permission::ALL.0)
    }

    pub(crate) fn code(self) -> u32 {
        self.0
    }

    /// Check that all `permissions` are set.
    pub fn can(self, permissions: Permission) -> bool {
        (self & permissions) == permissions
    }
}

impl ops::BitAnd for Permission {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Permission::from_raw(self.0 & rhs.0)
    }
}

impl ops::BitOr for Permission {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Permission::from_raw(self.0 | rhs.0)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if *self == Permission::ALL {
            return write!(f, "ALL");
        }
        if *self == Permission::NONE {
            return write!(f, "NONE");
        }

        let mut first = true;
        for (perm, name) in &[
            (Permission::READ, "READ"),
            (Permission::WRITE, "WRITE"),
            (Permission::CREATE, "CREATE"),
            (Permission::DELETE, "DELETE"),
            (Permission::ADMIN, "ADMIN"),
        ] {
            if self.can(*perm) {
                if !first {
                    write!(f, "|")?;
                }
                first = false;
                write!(f, "{}", name)?;
            }
        }
        Ok(())
    }
}

/// An identity under some authentication scheme, such as `world:anyone` or `digest:alice`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Id {
    /// The authentication scheme.
    pub scheme: String,
    /// The identity within that scheme.
    pub id: String,
}

impl Id {
    /// Build an identity from its scheme and name.
    pub fn new(scheme: impl Into<String>, id: impl Into<String>) -> Self {
        Id {
            scheme: scheme.into(),
            id: id.into(),
        }
    }

    /// The identity that matches every session.
    pub fn anyone() -> Self {
        Id::new("world", "anyone")
    }

    /// Stands in for whatever identities the creating session has authenticated as.
    pub fn creator() -> Self {
        Id::new("auth", "")
    }
}

/// An access control entry: the permissions granted to one identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Acl {
    /// The permissions associated with this ACL.
    pub perms: Permission,
    /// Who the permissions are granted to.
    pub id: Id,
}

impl Acl {
    /// Grant `perms` to `id`.
    pub fn new(id: Id, perms: Permission) -> Self {
        Acl { perms, id }
    }

    /// This ACL gives the creators authentication id's all permissions.
    pub fn creator_all() -> &'static [Acl] {
        &ACL_CREATOR_ALL[..]
    }

    /// This is a completely open ACL.
    pub fn open_unsafe() -> &'static [Acl] {
        &ACL_OPEN_UNSAFE[..]
    }

    /// This ACL gives the world the ability to read.
    pub fn read_unsafe() -> &'static [Acl] {
        &ACL_READ_UNSAFE[..]
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}:{}, {})", self.id.scheme, self.id.id, self.perms)
    }
}

static ACL_CREATOR_ALL: Lazy<[Acl; 1]> = Lazy::new(|| [Acl::new(Id::creator(), Permission::ALL)]);
static ACL_OPEN_UNSAFE: Lazy<[Acl; 1]> = Lazy::new(|| [Acl::new(Id::anyone(), Permission::ALL)]);
static ACL_READ_UNSAFE: Lazy<[Acl; 1]> =
    Lazy::new(|| [Acl::new(Id::anyone(), Permission::READ)]);

/// Authentication material presented to the service with `add_auth`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// The authentication scheme, e.g. `digest`.
    pub scheme: String,
    /// Scheme-specific opaque authentication bytes.
    pub auth: Vec<u8>,
}

impl Credential {
    /// Build a credential for `scheme`.
    pub fn new(scheme: impl Into<String>, auth: impl Into<Vec<u8>>) -> Self {
        Credential {
            scheme: scheme.into(),
            auth: auth.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // never print the secret
        f.debug_struct("Credential")
            .field("scheme", &self.scheme)
            .field("auth", &format_args!("<{} bytes>", self.auth.len()))
            .finish()
    }
}
