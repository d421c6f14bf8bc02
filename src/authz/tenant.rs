//! Tenant (clinic) scoping.
//!
//! The tenant binding is read from the resolved identity, never from session
//! state. Handlers receive a [`TenantScope`] from the authorizer and use it to
//! filter queries, stamp new rows and guard mutations.

use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use super::identity::Identity;
use super::Denial;
use crate::errors::{AppError, AppResult};

/// The clinic bound to `identity`, verbatim.
pub fn scope_for(identity: &Identity) -> Option<Uuid> {
    identity.clinic_id
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    /// Super-user: no tenant filter.
    Global {
        /// Own clinic, used only when stamping rows created without one.
        home: Option<Uuid>,
    },
    /// Bound to one clinic.
    Clinic(Uuid),
    /// Tenant-less, non-super-user identity: sees tenant-less rows only.
    Unbound,
}

impl TenantScope {
    pub fn for_identity(identity: &Identity) -> Self {
        if identity.super_user {
            return TenantScope::Global {
                home: scope_for(identity),
            };
        }
        match scope_for(identity) {
            Some(clinic_id) => TenantScope::Clinic(clinic_id),
            None => TenantScope::Unbound,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, TenantScope::Global { .. })
    }

    /// The caller's own tenant.
    pub fn tenant(&self) -> Option<Uuid> {
        match self {
            TenantScope::Global { home } => *home,
            TenantScope::Clinic(id) => Some(*id),
            TenantScope::Unbound => None,
        }
    }

    /// Whether a row bound to `record` is visible to this scope.
    pub fn permits(&self, record: Option<Uuid>) -> bool {
        match self {
            TenantScope::Global { .. } => true,
            _ => record == self.tenant(),
        }
    }

    /// Tenant to store on a new row. An omitted tenant takes the caller's;
    /// an explicit foreign tenant is refused unless the caller is global.
    pub fn stamp(&self, requested: Option<Uuid>) -> AppResult<Option<Uuid>> {
        match requested {
            None => Ok(self.tenant()),
            Some(id) if self.is_global() || Some(id) == self.tenant() => Ok(Some(id)),
            Some(_) => Err(AppError::forbidden(Denial::ForeignTenant)),
        }
    }

    /// Out-of-tenant rows read exactly like missing ones.
    pub fn ensure_visible(&self, record: Option<Uuid>, what: &str) -> AppResult<()> {
        if self.permits(record) {
            Ok(())
        } else {
            Err(AppError::not_found(format!("{what} not found")))
        }
    }

    /// Append the tenant predicate on `column` to a query being built.
    pub fn push_filter(&self, qb: &mut QueryBuilder<'_, Sqlite>, column: &str) {
        match self {
            TenantScope::Global { .. } => {
                qb.push("1 = 1");
            }
            TenantScope::Clinic(id) => {
                qb.push(column).push(" = ").push_bind(id.to_string());
            }
            TenantScope::Unbound => {
                qb.push(column).push(" IS NULL");
            }
        }
    }
}
