//! Arbitration record for a single connection attempt.
//!
//! One [`AdmissionRequest`] is owned by each registry and re-initialized for
//! every attempt. Subscribers of the `CONNECTION_REQUEST` notification vote on
//! it with [`allow`](AdmissionRequest::allow) and
//! [`deny`](AdmissionRequest::deny). The verdict is fail-closed: an attempt is
//! admitted only if somebody allowed it and nobody denied it.

use super::Connection;
use crate::error::{ErrorDescriptor, Result, SessionError};
use std::sync::Arc;

/// Mutable verdict for the attempt currently being arbitrated.
#[derive(Debug)]
pub struct AdmissionRequest {
    connection: Option<Arc<Connection>>,
    allowed: bool,
    denied: bool,
    error: ErrorDescriptor,
}

impl AdmissionRequest {
    /// Creates an unbound request in the default-deny state.
    pub fn new() -> Self {
        Self {
            connection: None,
            allowed: false,
            denied: false,
            error: ErrorDescriptor::server_full(),
        }
    }

    /// Resets the verdict and binds the request to `connection`.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] when no connection is given; the
    /// previous state is left untouched in that case.
    pub fn initialize(&mut self, connection: impl Into<Option<Arc<Connection>>>) -> Result<()> {
        let connection = connection
            .into()
            .ok_or(SessionError::InvalidArgument("admission requires a connection"))?;
        self.reset(connection);
        Ok(())
    }

    pub(crate) fn reset(&mut self, connection: Arc<Connection>) {
        self.connection = Some(connection);
        self.allowed = false;
        self.denied = false;
        self.error = ErrorDescriptor::server_full();
    }

    /// Votes to admit. A previous [`deny`](Self::deny) still wins.
    pub fn allow(&mut self) {
        self.allowed = true;
    }

    /// Votes to refuse with `error`. The last denial's descriptor is the one
    /// forwarded to the client.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] when no descriptor is given.
    pub fn deny(&mut self, error: impl Into<Option<ErrorDescriptor>>) -> Result<()> {
        let error = error
            .into()
            .ok_or(SessionError::InvalidArgument("deny requires an error descriptor"))?;
        self.error = error;
        self.denied = true;
        Ok(())
    }

    /// `denied || !allowed`: silence counts as refusal.
    pub fn is_denied(&self) -> bool {
        self.denied || !self.allowed
    }

    pub fn is_allowed(&self) -> bool {
        !self.is_denied()
    }

    /// Descriptor sent to the client if the attempt is refused.
    pub fn error(&self) -> &ErrorDescriptor {
        &self.error
    }

    /// The connection under arbitration, if any.
    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.connection.as_ref()
    }

    /// Drops the bound connection once arbitration is over.
    pub fn clear(&mut self) {
        self.connection = None;
    }
}

impl Default for AdmissionRequest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionRegistry;
    use crate::test_support::MockTransport;

    fn bound_request() -> AdmissionRequest {
        let registry = ConnectionRegistry::new();
        let mut request = AdmissionRequest::new();
        request
            .initialize(registry.wrap(MockTransport::new()))
            .expect("connection is present");
        request
    }

    #[test]
    fn test_default_is_deny_with_server_full() {
        let request = bound_request();
        assert!(request.is_denied());
        assert!(!request.is_allowed());
        assert_eq!(request.error(), &ErrorDescriptor::server_full());
    }

    #[test]
    fn test_allow_admits() {
        let mut request = bound_request();
        request.allow();
        assert!(request.is_allowed());
    }

    #[test]
    fn test_deny_wins_over_allow_in_any_order() {
        let mut request = bound_request();
        request.deny(ErrorDescriptor::new(42, "banned")).unwrap();
        request.allow();
        assert!(request.is_denied());

        let mut request = bound_request();
        request.allow();
        request.deny(ErrorDescriptor::new(1, "first")).unwrap();
        request.deny(ErrorDescriptor::new(2, "second")).unwrap();
        assert!(request.is_denied());
        assert_eq!(request.error(), &ErrorDescriptor::new(2, "second"));
    }

    #[test]
    fn test_missing_arguments_are_rejected() {
        let mut request = bound_request();
        assert!(matches!(
            request.deny(None::<ErrorDescriptor>),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(!request.denied);

        assert!(matches!(
            request.initialize(None::<Arc<Connection>>),
            Err(SessionError::InvalidArgument(_))
        ));
        assert!(request.connection().is_some());
    }

    #[test]
    fn test_initialize_resets_previous_verdict() {
        let registry = ConnectionRegistry::new();
        let mut request = AdmissionRequest::new();
        request.initialize(registry.wrap(MockTransport::new())).unwrap();
        request.allow();
        request.deny(ErrorDescriptor::new(9, "nope")).unwrap();
        request.clear();
        assert!(request.connection().is_none());

        request.initialize(registry.wrap(MockTransport::new())).unwrap();
        assert!(request.is_denied());
        assert!(!request.allowed);
        assert!(!request.denied);
        assert_eq!(request.error(), &ErrorDescriptor::server_full());
    }
}
