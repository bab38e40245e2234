use zbus::DBusError;

/// D-Bus-facing error, returned directly from interface methods (§7: *transport denied* and
/// *not initialised* map onto `AccessDenied`/`Failed`).
#[derive(Debug, DBusError)]
#[zbus(prefix = "org.freedesktop.GeoClue2")]
pub enum BusError {
    #[zbus(error)]
    ZBus(zbus::Error),

    /// A method/property operation by a peer other than the owning client.
    AccessDenied(String),

    /// The operation can't complete given the client's current state (e.g. `Stop()` on an
    /// already-stopped client).
    Failed(String),
}

impl BusError {
    pub fn access_denied(msg: impl Into<String>) -> Self {
        Self::AccessDenied(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
