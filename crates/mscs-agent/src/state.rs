use crate::{properties_store::PropertiesStore, worlds::WorldService};

#[derive(Clone, Debug)]
pub struct AppState {
    pub worlds: WorldService,
    pub properties: PropertiesStore,
}
