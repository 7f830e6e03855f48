//! Connected-services table (C7): per-connection, per-service entries
//! driving PM decisions — which profile (`app_id`) is active, what status
//! it's currently in, and whether its latest status change still needs to
//! be folded into an arbitration pass (`new_request`).

use std::collections::HashMap;

use crate::le::ConnHandle;
use crate::pm::policy::{AppId, ConnStatus};
use crate::pm::{Error, Result};

/// Opaque service identity, assigned by the caller (one per profile/service
/// instance registered against a connection — e.g. an A2DP stream, an HID
/// report channel).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ServiceId(pub u16);

/// Bound on the number of simultaneously tracked services per connection,
/// matching the "flat array (bounded)" data model.
pub const MAX_SERVICES_PER_CONN: usize = 8;

/// One row of the per-peer services table: `{id, app_id, state, new_request}`.
#[derive(Clone, Copy, Debug)]
pub struct ServiceEntry {
    pub id: ServiceId,
    pub app_id: AppId,
    pub state: ConnStatus,
    /// True from the moment this entry's status last changed until an
    /// arbitration pass has evaluated it; a fresh pass only adopts a
    /// timeout from entries where this is still set.
    pub new_request: bool,
}

/// Per-connection table of active service entries.
#[derive(Debug, Default)]
pub struct ServicesTable {
    by_conn: HashMap<ConnHandle, Vec<ServiceEntry>>,
}

impl ServicesTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `conn_status_change`: finds or creates `conn`'s entry for `id`,
    /// updates its `app_id`/`state`, and marks it as a fresh request. On
    /// `Close`/`NoPref` the entry is removed instead (compaction).
    /// Errors with [`Error::TooManyServices`] if a new entry would exceed
    /// [`MAX_SERVICES_PER_CONN`].
    pub fn update(
        &mut self,
        conn: ConnHandle,
        id: ServiceId,
        app_id: AppId,
        state: ConnStatus,
    ) -> Result<()> {
        let entries = self.by_conn.entry(conn).or_default();
        if matches!(state, ConnStatus::Close | ConnStatus::NoPref) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                self.by_conn.remove(&conn);
            }
            return Ok(());
        }
        if let Some(e) = entries.iter_mut().find(|e| e.id == id) {
            e.app_id = app_id;
            e.state = state;
            e.new_request = true;
        } else {
            if entries.len() >= MAX_SERVICES_PER_CONN {
                return Err(Error::TooManyServices);
            }
            entries.push(ServiceEntry { id, app_id, state, new_request: true });
        }
        Ok(())
    }

    /// Clears `new_request` on every entry for `conn`, called once an
    /// arbitration pass has evaluated them all.
    pub fn clear_new_requests(&mut self, conn: ConnHandle) {
        if let Some(entries) = self.by_conn.get_mut(&conn) {
            for e in entries {
                e.new_request = false;
            }
        }
    }

    /// Drops every service registered against `conn`, e.g. on disconnect.
    pub fn clear(&mut self, conn: ConnHandle) {
        self.by_conn.remove(&conn);
    }

    /// Iterates `conn`'s current service entries.
    pub fn entries(&self, conn: ConnHandle) -> impl Iterator<Item = &ServiceEntry> {
        self.by_conn.get(&conn).into_iter().flatten()
    }

    /// Whether `conn` has no tracked services at all.
    #[must_use]
    pub fn is_idle(&self, conn: ConnHandle) -> bool {
        self.by_conn.get(&conn).is_none_or(Vec::is_empty)
    }

    #[must_use]
    pub fn active_count(&self, conn: ConnHandle) -> usize {
        self.by_conn.get(&conn).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(v: u16) -> ConnHandle {
        ConnHandle::new(v).unwrap()
    }

    #[test]
    fn idle_until_a_service_is_opened() {
        let mut t = ServicesTable::new();
        let c = conn(1);
        assert!(t.is_idle(c));
        t.update(c, ServiceId(1), AppId::Hfp, ConnStatus::Open).unwrap();
        assert!(!t.is_idle(c));
        t.update(c, ServiceId(1), AppId::Hfp, ConnStatus::Close).unwrap();
        assert!(t.is_idle(c));
    }

    #[test]
    fn no_pref_compacts_the_entry_out() {
        let mut t = ServicesTable::new();
        let c = conn(2);
        t.update(c, ServiceId(1), AppId::A2dp, ConnStatus::Open).unwrap();
        t.update(c, ServiceId(2), AppId::Hid, ConnStatus::Open).unwrap();
        assert_eq!(t.active_count(c), 2);
        t.update(c, ServiceId(1), AppId::A2dp, ConnStatus::NoPref).unwrap();
        assert_eq!(t.active_count(c), 1);
    }

    #[test]
    fn new_request_clears_only_after_being_evaluated() {
        let mut t = ServicesTable::new();
        let c = conn(3);
        t.update(c, ServiceId(1), AppId::Hid, ConnStatus::Open).unwrap();
        assert!(t.entries(c).next().unwrap().new_request);
        t.clear_new_requests(c);
        assert!(!t.entries(c).next().unwrap().new_request);
    }

    #[test]
    fn overflow_past_the_bound_is_reported() {
        let mut t = ServicesTable::new();
        let c = conn(4);
        for i in 0..MAX_SERVICES_PER_CONN {
            t.update(c, ServiceId(i as u16), AppId::Other(0), ConnStatus::Open).unwrap();
        }
        assert_eq!(
            t.update(c, ServiceId(200), AppId::Other(0), ConnStatus::Open),
            Err(Error::TooManyServices)
        );
    }
}
