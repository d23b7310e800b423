//! Directory client over `ldap3`.

use crate::{
    config::{BindMethod, DirectoryLayout, LdapConfig},
    dn::DistinguishedName,
    filter::render_filter,
};
use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry, SearchResult};
use native_tls::{Certificate, TlsConnector};
use roster_core::{diff, outstanding, AttributeMap, Error, Modification, Result};
use secrecy::ExposeSecret;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::debug;

const SERVICE: &str = "ldap";

/// LDAP result codes the client interprets.
mod rc {
    pub const SUCCESS: u32 = 0;
    pub const TIME_LIMIT_EXCEEDED: u32 = 3;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const BUSY: u32 = 51;
    pub const UNAVAILABLE: u32 = 52;
    pub const ALREADY_EXISTS: u32 = 68;
    pub const OTHER: u32 = 80;
}

/// Search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Entry returned by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished name as returned by the server.
    pub dn: String,
    /// Attributes of the entry.
    pub attributes: AttributeMap,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapSession: Send {
    async fn bind(&mut self, method: &BindMethod) -> Result<()>;
    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>>;
    async fn add(&mut self, dn: &str, attributes: &AttributeMap) -> Result<()>;
    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<()>;
    async fn delete(&mut self, dn: &str) -> Result<()>;
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub(crate) trait LdapConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LdapSession>>;
}

/// Directory client with a pluggable LDAP backend.
///
/// Every operation opens a session, binds with the configured method, runs one request and
/// unbinds. "No such object" is reported as an absent entry by [`DirectoryClient::lookup`] and
/// as [`Error::NotFound`] elsewhere; transport failures are [`Error::ServiceUnavailable`] and
/// expired operation deadlines are [`Error::Timeout`].
pub struct DirectoryClient {
    config: Arc<LdapConfig>,
    connector: Box<dyn LdapConnector>,
}

impl DirectoryClient {
    /// Creates a client that uses the real LDAP connector.
    #[must_use]
    pub fn new(config: LdapConfig) -> Self {
        let config = Arc::new(config);
        let connector: Box<dyn LdapConnector> = Box::new(RealLdapConnector::new(config.clone()));
        Self { config, connector }
    }

    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_connector(config: LdapConfig, connector: Box<dyn LdapConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// User and group subtree layout.
    #[must_use]
    pub fn layout(&self) -> &DirectoryLayout {
        self.config.layout()
    }

    /// Fetches all attributes of one entry.
    ///
    /// # Errors
    ///
    /// Returns transport and server errors; a missing entry is `Ok(None)`.
    pub async fn lookup(&self, dn: &DistinguishedName) -> Result<Option<AttributeMap>> {
        let mut session = self.admin_session().await?;
        let outcome = self
            .execute_with_timeout(session.search(
                dn.as_str(),
                SearchScope::Base,
                "(objectClass=*)",
                &["*"],
            ))
            .await;
        let outcome = self.finish(session, outcome).await;

        match outcome {
            Ok(entries) => Ok(entries.into_iter().next().map(|entry| entry.attributes)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Adds a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the DN is taken and [`Error::ValidationError`] for an
    /// empty attribute map.
    pub async fn add(&self, dn: &DistinguishedName, attributes: &AttributeMap) -> Result<()> {
        if attributes.is_empty() {
            return Err(Error::ValidationError(format!(
                "refusing to add `{dn}` without attributes"
            )));
        }

        debug!(dn = %dn, attributes = attributes.len(), "adding directory entry");
        let mut session = self.admin_session().await?;
        let outcome = self
            .execute_with_timeout(session.add(dn.as_str(), attributes))
            .await;
        self.finish(session, outcome).await
    }

    /// Brings an entry from `old` to `new` with one modify request.
    ///
    /// The diff is checked against the entry as stored, so changes that are already in place
    /// are not sent again. Returns the operations sent; when nothing is outstanding no modify
    /// request is made, and equal maps never contact the server at all.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist.
    pub async fn modify(
        &self,
        dn: &DistinguishedName,
        old: &AttributeMap,
        new: &AttributeMap,
    ) -> Result<Vec<Modification>> {
        let intended = diff(old, new);
        if intended.is_empty() {
            debug!(dn = %dn, "entry already up to date");
            return Ok(intended);
        }

        let mut session = self.admin_session().await?;
        let outcome = self.modify_outstanding(session.as_mut(), dn, &intended).await;
        self.finish(session, outcome).await
    }

    async fn modify_outstanding(
        &self,
        session: &mut dyn LdapSession,
        dn: &DistinguishedName,
        intended: &[Modification],
    ) -> Result<Vec<Modification>> {
        let current = self
            .execute_with_timeout(session.search(
                dn.as_str(),
                SearchScope::Base,
                "(objectClass=*)",
                &["*"],
            ))
            .await?
            .into_iter()
            .next()
            .map(|entry| entry.attributes)
            .ok_or_else(|| Error::NotFound(format!("no such directory entry `{dn}`")))?;

        let modifications = outstanding(intended, &current);
        if modifications.is_empty() {
            debug!(dn = %dn, "changes already applied");
            return Ok(modifications);
        }

        debug!(dn = %dn, operations = modifications.len(), "modifying directory entry");
        self.execute_with_timeout(session.modify(dn.as_str(), &modifications))
            .await?;
        Ok(modifications)
    }

    /// Deletes an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist.
    pub async fn delete(&self, dn: &DistinguishedName) -> Result<()> {
        debug!(dn = %dn, "deleting directory entry");
        let mut session = self.admin_session().await?;
        let outcome = self.execute_with_timeout(session.delete(dn.as_str())).await;
        self.finish(session, outcome).await
    }

    /// Searches the subtree under `base`.
    ///
    /// `filter` is a template whose `{}` placeholders are replaced by the escaped `params` in
    /// order. An empty `attributes` list requests every user attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if placeholders and parameters disagree, and
    /// [`Error::NotFound`] if the base does not exist.
    pub async fn search(
        &self,
        base: &DistinguishedName,
        filter: &str,
        params: &[String],
        attributes: &[&'static str],
    ) -> Result<BTreeMap<String, AttributeMap>> {
        let filter = render_filter(filter, params)?;
        let attributes = if attributes.is_empty() { &["*"][..] } else { attributes };

        debug!(base = %base, filter = %filter, "searching directory");
        let mut session = self.admin_session().await?;
        let outcome = self
            .execute_with_timeout(session.search(
                base.as_str(),
                SearchScope::Subtree,
                &filter,
                attributes,
            ))
            .await;
        let entries = self.finish(session, outcome).await?;

        Ok(entries
            .into_iter()
            .map(|entry| (entry.dn, entry.attributes))
            .collect())
    }

    async fn admin_session(&self) -> Result<Box<dyn LdapSession>> {
        let mut session = self.connector.connect().await?;
        self.execute_with_timeout(session.bind(self.config.bind()))
            .await?;
        Ok(session)
    }

    async fn finish<T>(&self, mut session: Box<dyn LdapSession>, outcome: Result<T>) -> Result<T> {
        if let Err(err) = self.execute_with_timeout(session.unbind()).await {
            debug!(error = %err, "directory unbind failed");
        }
        outcome
    }

    async fn execute_with_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let limit = self.config.operation_timeout();
        timeout(limit, fut).await.map_err(|_| {
            Error::Timeout(format!(
                "directory operation timed out after {}s",
                limit.as_secs()
            ))
        })?
    }
}

/// Real LDAP connector backed by `ldap3`.
pub(crate) struct RealLdapConnector {
    config: Arc<LdapConfig>,
}

impl RealLdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub(crate) fn new(config: Arc<LdapConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LdapConnector for RealLdapConnector {
    async fn connect(&self) -> Result<Box<dyn LdapSession>> {
        let settings = build_ldap_settings(&self.config).await?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(|err| map_ldap_error(err, self.config.url()))?;
        ldap3::drive!(conn);
        Ok(Box::new(RealLdapSession { inner: ldap }))
    }
}

struct RealLdapSession {
    inner: ldap3::Ldap,
}

#[async_trait]
impl LdapSession for RealLdapSession {
    async fn bind(&mut self, method: &BindMethod) -> Result<()> {
        let result = match method {
            BindMethod::Anonymous => return Ok(()),
            BindMethod::Simple { dn, password } => {
                self.inner
                    .simple_bind(dn.as_str(), password.expose_secret())
                    .await
            }
            BindMethod::SaslExternal => self.inner.sasl_external_bind().await,
        }
        .map_err(|err| map_ldap_error(err, "bind"))?;
        check_result(&result, "bind")
    }

    async fn search(
        &mut self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[&'static str],
    ) -> Result<Vec<LdapEntry>> {
        let SearchResult(entries, result) = self
            .inner
            .search(base_dn, scope.into(), filter, attributes.to_vec())
            .await
            .map_err(|err| map_ldap_error(err, base_dn))?;
        check_result(&result, base_dn)?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| LdapEntry {
                dn: entry.dn,
                attributes: AttributeMap::from(entry.attrs),
            })
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| (name.clone(), values.iter().cloned().collect::<HashSet<_>>()))
            .collect::<Vec<_>>();
        let result = self
            .inner
            .add(dn, attrs)
            .await
            .map_err(|err| map_ldap_error(err, dn))?;
        check_result(&result, dn)
    }

    async fn modify(&mut self, dn: &str, modifications: &[Modification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|modification| {
                let attribute = modification.attribute().to_string();
                let values = modification.values().iter().cloned().collect::<HashSet<_>>();
                match modification {
                    Modification::Add { .. } => Mod::Add(attribute, values),
                    Modification::Remove { .. } => Mod::Delete(attribute, values),
                }
            })
            .collect::<Vec<_>>();
        let result = self
            .inner
            .modify(dn, mods)
            .await
            .map_err(|err| map_ldap_error(err, dn))?;
        check_result(&result, dn)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let result = self
            .inner
            .delete(dn)
            .await
            .map_err(|err| map_ldap_error(err, dn))?;
        check_result(&result, dn)
    }

    async fn unbind(&mut self) -> Result<()> {
        self.inner
            .unbind()
            .await
            .map_err(|err| map_ldap_error(err, "unbind"))
    }
}

async fn build_ldap_settings(config: &LdapConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new()
        .set_conn_timeout(config.connection_timeout())
        .set_starttls(config.starttls());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = tokio::fs::read(cert_path).await.map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| Error::ConfigError(format!("invalid directory CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn check_result(result: &ldap3::LdapResult, target: &str) -> Result<()> {
    if result.rc == rc::SUCCESS {
        Ok(())
    } else {
        Err(map_result_code(result.rc, &result.text, target))
    }
}

fn map_result_code(code: u32, text: &str, target: &str) -> Error {
    match code {
        rc::NO_SUCH_OBJECT => Error::NotFound(format!("no such directory entry `{target}`")),
        rc::ALREADY_EXISTS => {
            Error::AlreadyExists(format!("directory entry `{target}` already exists"))
        }
        rc::TIME_LIMIT_EXCEEDED => {
            Error::Timeout(format!("directory time limit exceeded for `{target}`"))
        }
        rc::BUSY | rc::UNAVAILABLE | rc::OTHER => {
            Error::ServiceUnavailable(format!("directory unavailable (result code {code}): {text}"))
        }
        rc::INVALID_CREDENTIALS => Error::ExternalServiceError {
            service: SERVICE.to_string(),
            message: "invalid bind credentials".to_string(),
        },
        _ => Error::ExternalServiceError {
            service: SERVICE.to_string(),
            message: format!("result code {code} for `{target}`: {text}"),
        },
    }
}

fn map_ldap_error(err: LdapError, target: &str) -> Error {
    match err {
        LdapError::LdapResult { result } => map_result_code(result.rc, &result.text, target),
        LdapError::Timeout { .. } => {
            Error::Timeout(format!("directory request for `{target}` timed out"))
        }
        LdapError::Io { .. }
        | LdapError::EndOfStream
        | LdapError::OpSend { .. }
        | LdapError::ResultRecv { .. } => {
            Error::ServiceUnavailable(format!("directory connection failed: {err}"))
        }
        other => Error::MalformedResponse {
            service: SERVICE.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn sample_config() -> LdapConfig {
        let layout =
            DirectoryLayout::parse("ou=People,dc=example,dc=org", "ou=Group,dc=example,dc=org")
                .unwrap();
        LdapConfig::new("ldap://ldap.example.org", BindMethod::SaslExternal, layout).unwrap()
    }

    fn bound_session() -> MockLdapSession {
        let mut session = MockLdapSession::new();
        session.expect_bind().times(1).returning(|_| Ok(()));
        session.expect_unbind().times(1).returning(|| Ok(()));
        session
    }

    fn client_with(session: MockLdapSession) -> DirectoryClient {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(1)
            .return_once(move || Ok(Box::new(session)));
        DirectoryClient::with_connector(sample_config(), Box::new(connector))
    }

    fn user_dn() -> DistinguishedName {
        sample_config().layout().user_dn("jdoe")
    }

    #[tokio::test]
    async fn lookup_returns_entry_attributes() {
        let mut session = bound_session();
        session
            .expect_search()
            .withf(|base, scope, filter, _| {
                base == "uid=jdoe,ou=People,dc=example,dc=org"
                    && *scope == SearchScope::Base
                    && filter == "(objectClass=*)"
            })
            .returning(|base, _, _, _| {
                Ok(vec![LdapEntry {
                    dn: base.to_string(),
                    attributes: AttributeMap::new().with("uid", ["jdoe"]),
                }])
            });

        let client = client_with(session);
        let entry = client.lookup(&user_dn()).await.unwrap().unwrap();
        assert_eq!(entry.first("uid"), Some("jdoe"));
    }

    #[tokio::test]
    async fn lookup_of_missing_entry_is_absent() {
        let mut session = bound_session();
        session
            .expect_search()
            .returning(|base, _, _, _| Err(map_result_code(rc::NO_SUCH_OBJECT, "", base)));

        let client = client_with(session);
        assert_eq!(client.lookup(&user_dn()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn lookup_propagates_transport_errors() {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .return_once(|| Err(Error::ServiceUnavailable("connection refused".to_string())));
        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector));

        let err = client.lookup(&user_dn()).await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn modify_without_changes_never_connects() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector));

        let entry = AttributeMap::new().with("term", ["f2006"]);
        let ops = client.modify(&user_dn(), &entry, &entry.clone()).await.unwrap();
        assert!(ops.is_empty());
    }

    fn stored_entry(session: &mut MockLdapSession, entry: AttributeMap) {
        session
            .expect_search()
            .withf(|base, scope, _, _| {
                base == "uid=jdoe,ou=People,dc=example,dc=org" && *scope == SearchScope::Base
            })
            .times(1)
            .returning(move |base, _, _, _| {
                Ok(vec![LdapEntry {
                    dn: base.to_string(),
                    attributes: entry.clone(),
                }])
            });
    }

    #[tokio::test]
    async fn modify_sends_one_request_with_the_diff() {
        let mut session = bound_session();
        stored_entry(&mut session, AttributeMap::new().with("term", ["f2006"]));
        session
            .expect_modify()
            .times(1)
            .withf(|dn, modifications| {
                dn == "uid=jdoe,ou=People,dc=example,dc=org"
                    && *modifications
                        == [Modification::Add {
                            attribute: "term".to_string(),
                            values: BTreeSet::from(["w2007".to_string()]),
                        }]
            })
            .returning(|_, _| Ok(()));

        let client = client_with(session);
        let old = AttributeMap::new().with("term", ["f2006"]);
        let new = AttributeMap::new().with("term", ["f2006", "w2007"]);
        let ops = client.modify(&user_dn(), &old, &new).await.unwrap();
        assert_eq!(ops.len(), 1);
    }

    #[tokio::test]
    async fn repeating_an_applied_modify_is_a_no_op() {
        let old = AttributeMap::new().with("term", ["f2006"]);
        let new = AttributeMap::new().with("term", ["f2006", "w2007"]);

        let mut sessions = Vec::new();
        for _ in 0..2 {
            let mut session = bound_session();
            stored_entry(&mut session, new.clone());
            session.expect_modify().never();
            sessions.push(session);
        }
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .times(2)
            .returning(move || Ok(Box::new(sessions.pop().unwrap())));
        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector));

        assert!(client.modify(&user_dn(), &old, &new).await.unwrap().is_empty());
        assert!(client.modify(&user_dn(), &old, &new).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn modify_sends_only_what_is_still_missing() {
        let mut session = bound_session();
        stored_entry(
            &mut session,
            AttributeMap::new()
                .with("term", ["f2006", "w2007"])
                .with("loginShell", ["/bin/sh"]),
        );
        session
            .expect_modify()
            .times(1)
            .withf(|_, modifications| {
                modifications.iter().all(|op| op.attribute() == "loginShell")
                    && modifications.len() == 2
            })
            .returning(|_, _| Ok(()));

        let client = client_with(session);
        let old = AttributeMap::new()
            .with("term", ["f2006"])
            .with("loginShell", ["/bin/sh"]);
        let new = AttributeMap::new()
            .with("term", ["f2006", "w2007"])
            .with("loginShell", ["/bin/bash"]);
        let ops = client.modify(&user_dn(), &old, &new).await.unwrap();
        assert_eq!(ops.len(), 2);
    }

    #[tokio::test]
    async fn modify_of_missing_entry_is_not_found() {
        let mut session = bound_session();
        session
            .expect_search()
            .returning(|base, _, _, _| Err(map_result_code(rc::NO_SUCH_OBJECT, "", base)));
        session.expect_modify().never();

        let client = client_with(session);
        let old = AttributeMap::new();
        let new = AttributeMap::new().with("term", ["f2006"]);
        let err = client.modify(&user_dn(), &old, &new).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn add_of_existing_entry_reports_already_exists() {
        let mut session = bound_session();
        session
            .expect_add()
            .returning(|dn, _| Err(map_result_code(rc::ALREADY_EXISTS, "", dn)));

        let client = client_with(session);
        let attrs = AttributeMap::new().with("uid", ["jdoe"]);
        let err = client.add(&user_dn(), &attrs).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn add_requires_attributes() {
        let mut connector = MockLdapConnector::new();
        connector.expect_connect().never();
        let client = DirectoryClient::with_connector(sample_config(), Box::new(connector));

        let err = client.add(&user_dn(), &AttributeMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[tokio::test]
    async fn search_escapes_parameters() {
        let mut session = bound_session();
        session
            .expect_search()
            .withf(|base, scope, filter, attributes| {
                base == "ou=People,dc=example,dc=org"
                    && *scope == SearchScope::Subtree
                    && filter == "(uid=\\2a)"
                    && *attributes == ["uidNumber"]
            })
            .returning(|_, _, _, _| {
                Ok(vec![LdapEntry {
                    dn: "uid=jdoe,ou=People,dc=example,dc=org".to_string(),
                    attributes: AttributeMap::new().with("uidNumber", ["20001"]),
                }])
            });

        let client = client_with(session);
        let base = client.layout().users_base().clone();
        let entries = client
            .search(&base, "(uid={})", &["*".to_string()], &["uidNumber"])
            .await
            .unwrap();
        assert_eq!(
            entries["uid=jdoe,ou=People,dc=example,dc=org"].first("uidNumber"),
            Some("20001")
        );
    }

    struct StalledSession;

    #[async_trait]
    impl LdapSession for StalledSession {
        async fn bind(&mut self, _method: &BindMethod) -> Result<()> {
            Ok(())
        }

        async fn search(
            &mut self,
            _base_dn: &str,
            _scope: SearchScope,
            _filter: &str,
            _attributes: &[&'static str],
        ) -> Result<Vec<LdapEntry>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn add(&mut self, _dn: &str, _attributes: &AttributeMap) -> Result<()> {
            Ok(())
        }

        async fn modify(&mut self, _dn: &str, _modifications: &[Modification]) -> Result<()> {
            Ok(())
        }

        async fn delete(&mut self, _dn: &str) -> Result<()> {
            Ok(())
        }

        async fn unbind(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stalled_operations_time_out_as_retryable() {
        let mut connector = MockLdapConnector::new();
        connector
            .expect_connect()
            .return_once(|| Ok(Box::new(StalledSession)));
        let config = sample_config().with_operation_timeout_secs(0);
        let client = DirectoryClient::with_connector(config, Box::new(connector));

        let err = client.lookup(&user_dn()).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreadable_ca_certificate_is_a_config_error() {
        let config = sample_config().with_tls_ca_cert("/nonexistent/ca.pem".into());

        let err = build_ldap_settings(&config).await.err().unwrap();
        assert!(matches!(err, Error::ConfigError(ref message) if message.contains("ca.pem")));
    }

    #[test]
    fn result_codes_map_to_typed_errors() {
        assert!(matches!(map_result_code(32, "", "x"), Error::NotFound(_)));
        assert!(matches!(map_result_code(68, "", "x"), Error::AlreadyExists(_)));
        assert!(map_result_code(52, "unavailable", "x").is_retryable());
        assert!(!map_result_code(50, "insufficient access", "x").is_retryable());
    }
}
