use std::sync::Arc;

use broker::Broker;
use cache::ResultCache;
use controller::Controller;

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<dyn Broker>,
    pub cache: Arc<ResultCache>,
    pub controller: Arc<Controller>,
}
