//! POSIX account and group entries.

use roster_core::{AttributeMap, Error, Result};

/// Object classes every account entry carries.
pub const ACCOUNT_OBJECT_CLASSES: &[&str] = &["top", "account", "posixAccount", "shadowAccount"];
/// Object classes every group entry carries.
pub const GROUP_OBJECT_CLASSES: &[&str] = &["top", "group", "posixGroup"];

/// Attributes the account builder owns; callers cannot override them.
pub const RESERVED_ACCOUNT_ATTRIBUTES: &[&str] =
    &["objectClass", "uid", "uidNumber", "gidNumber", "homeDirectory"];

/// A `posixAccount` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixAccount {
    /// Login name (`uid`).
    pub username: String,
    /// Numeric user id.
    pub uid_number: u32,
    /// Primary group id.
    pub gid_number: u32,
    /// Home directory.
    pub home_directory: String,
    /// Login shell.
    pub login_shell: String,
    /// Display name (`cn`).
    pub cn: String,
    /// GECOS field.
    pub gecos: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Academic program (members only).
    pub program: Option<String>,
    /// Registered membership terms.
    pub terms: Vec<String>,
    /// Object classes beyond [`ACCOUNT_OBJECT_CLASSES`].
    pub extra_object_classes: Vec<String>,
}

impl PosixAccount {
    /// Starts a builder with the required fields.
    ///
    /// The display name defaults to the username.
    #[must_use]
    pub fn builder(
        username: impl Into<String>,
        uid_number: u32,
        gid_number: u32,
    ) -> PosixAccountBuilder {
        let username = username.into();
        PosixAccountBuilder {
            account: Self {
                cn: username.clone(),
                home_directory: format!("/home/{username}"),
                username,
                uid_number,
                gid_number,
                login_shell: "/bin/bash".to_string(),
                gecos: None,
                description: None,
                program: None,
                terms: Vec::new(),
                extra_object_classes: Vec::new(),
            },
        }
    }

    /// Directory attributes for this account.
    #[must_use]
    pub fn to_attributes(&self) -> AttributeMap {
        let object_classes = ACCOUNT_OBJECT_CLASSES
            .iter()
            .map(|class| (*class).to_string())
            .chain(self.extra_object_classes.iter().cloned());

        let mut attributes = AttributeMap::new()
            .with("objectClass", object_classes)
            .with("uid", [self.username.as_str()])
            .with("cn", [self.cn.as_str()])
            .with("uidNumber", [self.uid_number.to_string()])
            .with("gidNumber", [self.gid_number.to_string()])
            .with("homeDirectory", [self.home_directory.as_str()])
            .with("loginShell", [self.login_shell.as_str()])
            .with("term", self.terms.iter().cloned());
        if let Some(gecos) = &self.gecos {
            attributes.set("gecos", [gecos.as_str()]);
        }
        if let Some(description) = &self.description {
            attributes.set("description", [description.as_str()]);
        }
        if let Some(program) = &self.program {
            attributes.set("program", [program.as_str()]);
        }
        attributes
    }

    /// Reads an account back from directory attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if a required attribute is missing or a numeric id
    /// does not parse.
    pub fn from_attributes(attributes: &AttributeMap) -> Result<Self> {
        let required = |name: &str| {
            attributes
                .first(name)
                .map(str::to_string)
                .ok_or_else(|| malformed(format!("account entry missing `{name}`")))
        };
        let optional = |name: &str| attributes.first(name).map(str::to_string);

        let username = required("uid")?;
        Ok(Self {
            uid_number: numeric_attribute(attributes, "uidNumber")?
                .ok_or_else(|| malformed(format!("account `{username}` missing `uidNumber`")))?,
            gid_number: numeric_attribute(attributes, "gidNumber")?
                .ok_or_else(|| malformed(format!("account `{username}` missing `gidNumber`")))?,
            home_directory: required("homeDirectory")?,
            login_shell: optional("loginShell").unwrap_or_default(),
            cn: optional("cn").unwrap_or_else(|| username.clone()),
            gecos: optional("gecos"),
            description: optional("description"),
            program: optional("program"),
            terms: attributes
                .get("term")
                .map(|terms| terms.iter().cloned().collect())
                .unwrap_or_default(),
            extra_object_classes: attributes
                .get("objectClass")
                .map(|classes| {
                    classes
                        .iter()
                        .filter(|class| !ACCOUNT_OBJECT_CLASSES.contains(&class.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            username,
        })
    }
}

/// Builder for [`PosixAccount`].
#[derive(Debug)]
pub struct PosixAccountBuilder {
    account: PosixAccount,
}

impl PosixAccountBuilder {
    /// Sets the home directory.
    #[must_use]
    pub fn home_directory(mut self, home: impl Into<String>) -> Self {
        self.account.home_directory = home.into();
        self
    }

    /// Sets the login shell.
    #[must_use]
    pub fn login_shell(mut self, shell: impl Into<String>) -> Self {
        self.account.login_shell = shell.into();
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn cn(mut self, cn: impl Into<String>) -> Self {
        self.account.cn = cn.into();
        self
    }

    /// Sets the GECOS field.
    #[must_use]
    pub fn gecos(mut self, gecos: impl Into<String>) -> Self {
        self.account.gecos = Some(gecos.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.account.description = Some(description.into());
        self
    }

    /// Sets the program.
    #[must_use]
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.account.program = Some(program.into());
        self
    }

    /// Appends a membership term.
    #[must_use]
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.account.terms.push(term.into());
        self
    }

    /// Adds an object class, e.g. `member` or `club`.
    #[must_use]
    pub fn object_class(mut self, class: impl Into<String>) -> Self {
        self.account.extra_object_classes.push(class.into());
        self
    }

    /// Builds the [`PosixAccount`].
    #[must_use]
    pub fn build(self) -> PosixAccount {
        self.account
    }
}

/// A `posixGroup` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosixGroup {
    /// Group name (`cn`).
    pub name: String,
    /// Numeric group id.
    pub gid_number: u32,
    /// Optional description.
    pub description: Option<String>,
    /// Member usernames (`memberUid`).
    pub members: Vec<String>,
}

impl PosixGroup {
    /// Creates a group with no members.
    #[must_use]
    pub fn new(name: impl Into<String>, gid_number: u32) -> Self {
        Self {
            name: name.into(),
            gid_number,
            description: None,
            members: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a member.
    #[must_use]
    pub fn with_member(mut self, username: impl Into<String>) -> Self {
        self.members.push(username.into());
        self
    }

    /// Directory attributes for this group.
    #[must_use]
    pub fn to_attributes(&self) -> AttributeMap {
        let mut attributes = AttributeMap::new()
            .with("objectClass", GROUP_OBJECT_CLASSES.iter().copied())
            .with("cn", [self.name.as_str()])
            .with("gidNumber", [self.gid_number.to_string()])
            .with("memberUid", self.members.iter().cloned());
        if let Some(description) = &self.description {
            attributes.set("description", [description.as_str()]);
        }
        attributes
    }

    /// Reads a group back from directory attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedResponse`] if `cn` or `gidNumber` is missing or invalid.
    pub fn from_attributes(attributes: &AttributeMap) -> Result<Self> {
        let name = attributes
            .first("cn")
            .ok_or_else(|| malformed("group entry missing `cn`".to_string()))?
            .to_string();
        let gid_number = numeric_attribute(attributes, "gidNumber")?
            .ok_or_else(|| malformed(format!("group `{name}` missing `gidNumber`")))?;
        Ok(Self {
            name,
            gid_number,
            description: attributes.first("description").map(str::to_string),
            members: attributes
                .get("memberUid")
                .map(|members| members.iter().cloned().collect())
                .unwrap_or_default(),
        })
    }
}

/// Parses a single-valued numeric attribute such as `uidNumber`.
///
/// # Errors
///
/// Returns [`Error::MalformedResponse`] if the value is not a non-negative integer.
pub fn numeric_attribute(attributes: &AttributeMap, name: &str) -> Result<Option<u32>> {
    attributes
        .first(name)
        .map(|value| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| malformed(format!("`{name}` is not numeric: {value}")))
        })
        .transpose()
}

fn malformed(message: String) -> Error {
    Error::MalformedResponse {
        service: "ldap".to_string(),
        message,
    }
}
