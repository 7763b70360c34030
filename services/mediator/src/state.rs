use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use mediator_protocol::BrokerAddr;

use crate::broker::{BrokerError, BrokerRegistry};
use crate::channels::ChannelCache;
use crate::directory::EndpointDirectory;
use crate::dispatch::PushDispatcher;
use crate::fcm::FcmBridge;
use crate::forward::{ForwardWrapper, JsonForwardWrapper};
use crate::pull::PullHub;
use crate::settings::Settings;

/// Process-wide shared state.
///
/// `new` is the single construction site for every registry and cache; all
/// teardown is scoped to these owners, nothing relies on finalization order.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub settings: Arc<Settings>,
    pub registry: Arc<BrokerRegistry>,
    pub directory: Arc<EndpointDirectory>,
    pub channels: ChannelCache,
    pub dispatcher: Arc<PushDispatcher>,
    pub pull: Arc<PullHub>,
    pub fcm: Arc<FcmBridge>,
    pub wrapper: Arc<dyn ForwardWrapper>,
}

impl AppState {
    pub fn new(pool: PgPool, settings: Settings) -> Self {
        let settings = Arc::new(settings);
        let registry = Arc::new(BrokerRegistry::new(settings.brokers.clone()));
        let directory = Arc::new(EndpointDirectory::new(pool.clone()));
        let channels = ChannelCache::new(
            Arc::clone(&registry),
            settings.channel_cache_capacity,
            settings.channel_cache_ttl,
            settings.shared_reverse_channel,
        );
        let dispatcher = Arc::new(PushDispatcher::new(
            Arc::clone(&directory),
            channels.clone(),
        ));
        let pull = Arc::new(PullHub::new(settings.channel_cache_ttl));
        let fcm = Arc::new(FcmBridge::new(settings.fcm_api_key.clone()));
        Self {
            pool,
            settings,
            registry,
            directory,
            channels,
            dispatcher,
            pull,
            fcm,
            wrapper: Arc::new(JsonForwardWrapper),
        }
    }

    /// The address a camped listener should subscribe on.
    ///
    /// Endpoints without a stored binding get one on the fly: a live broker
    /// is selected and `uid` becomes the channel name, persisted so the next
    /// inbound POST resolves it.
    pub async fn listener_address(
        &self,
        endpoint_uid: &str,
    ) -> Result<Option<BrokerAddr>, ListenerBindError> {
        let Some(endpoint) =
            crate::repo::endpoints::load_endpoint(&self.pool, endpoint_uid).await?
        else {
            return Ok(None);
        };
        if let Some(stored) = endpoint.pub_sub_address.as_deref() {
            if let Ok(addr) = BrokerAddr::parse(stored) {
                return Ok(Some(addr));
            }
        }
        let server = self.registry.select(None).await?;
        let addr = BrokerAddr::new(server, endpoint_uid);
        self.directory.rebind(endpoint_uid, &addr).await?;
        info!(endpoint_uid = %endpoint_uid, address = %addr, "endpoint bound for listening");
        Ok(Some(addr))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerBindError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}
