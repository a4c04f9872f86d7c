//! Static backend table and the one-shot selector over it.

use super::backend::PlayerBackend;
use super::graph::GraphPlayer;
use super::session::SessionPlayer;
use crate::error::PlayerError;
use crate::platform::rodio::{MediaPlatform, RodioGraphFactory, RodioSessionPlatform};
use crate::settings::EngineSettings;

pub type BackendConstructor = fn(&EngineSettings) -> Result<Box<dyn PlayerBackend>, PlayerError>;

#[derive(Clone, Copy)]
pub struct BackendDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub create: BackendConstructor,
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Probe order when no backend is preferred.
pub static BACKENDS: &[BackendDescriptor] = &[
    BackendDescriptor {
        id: "session",
        name: "media session (async)",
        create: create_session,
    },
    BackendDescriptor {
        id: "graph",
        name: "filter graph (sync)",
        create: create_graph,
    },
];

fn start_platform(id: &'static str, settings: &EngineSettings) -> Result<MediaPlatform, PlayerError> {
    MediaPlatform::startup(&settings.platform_config())
        .map_err(|source| PlayerError::BackendInit { id, source })
}

fn create_session(settings: &EngineSettings) -> Result<Box<dyn PlayerBackend>, PlayerError> {
    let platform = start_platform("session", settings)?;
    let player = SessionPlayer::new(
        RodioSessionPlatform::new(platform),
        settings.backend_options(),
    )?;
    Ok(Box::new(player))
}

fn create_graph(settings: &EngineSettings) -> Result<Box<dyn PlayerBackend>, PlayerError> {
    let platform = start_platform("graph", settings)?;
    let player = GraphPlayer::new(RodioGraphFactory::new(platform), settings.backend_options())?;
    Ok(Box::new(player))
}

/// `table` with the descriptor named `preferred` moved to the front.
pub fn probe_order<'a>(table: &'a [BackendDescriptor], preferred: Option<&str>) -> Vec<&'a BackendDescriptor> {
    let mut order: Vec<&BackendDescriptor> = table.iter().collect();
    let Some(preferred) = preferred.map(str::trim).filter(|p| !p.is_empty()) else {
        return order;
    };
    match order.iter().position(|d| d.id.eq_ignore_ascii_case(preferred)) {
        Some(index) => {
            let descriptor = order.remove(index);
            order.insert(0, descriptor);
        }
        None => tracing::warn!(backend = preferred, "unknown backend requested, ignored"),
    }
    order
}

/// Construct the first backend that comes up. Every constructor runs at most
/// once; the ones after the winner are never touched.
pub fn select_backend(
    table: &[BackendDescriptor],
    preferred: Option<&str>,
    settings: &EngineSettings,
) -> Result<(BackendDescriptor, Box<dyn PlayerBackend>), PlayerError> {
    for descriptor in probe_order(table, preferred) {
        match (descriptor.create)(settings) {
            Ok(backend) => {
                tracing::info!(backend = descriptor.id, name = descriptor.name, "backend selected");
                return Ok((*descriptor, backend));
            }
            Err(e) => {
                tracing::warn!(backend = descriptor.id, err = %e, "backend unavailable");
            }
        }
    }
    tracing::error!(probed = table.len(), "no playback backend available");
    Err(PlayerError::NoBackendAvailable)
}
