use std::sync::Arc;

use tracing::{info, warn};

use super::{
    config::Config,
    database::{MemoryStore, RecordStore, StoreError},
    mailer::{HttpMailer, Notifier},
    notify::Dispatcher,
    rate_limit::{RateLimiter, WindowLimiter},
    redis_store::RedisStore,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub limiter: Arc<dyn RateLimiter>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let store: Arc<dyn RecordStore> = match &config.redis_url {
            Some(redis_url) => {
                info!("Connecting to Redis...");
                Arc::new(RedisStore::connect(redis_url).await?)
            }
            None => {
                warn!("REDIS_URL not set, orders are kept in memory and lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let notifier = HttpMailer::from_config(&config.mail)
            .map(|mailer| Arc::new(mailer) as Arc<dyn Notifier>);
        if notifier.is_none() {
            warn!("Mail transport not configured, confirmation emails are disabled");
        }

        Ok(Self::from_parts(
            config,
            store,
            Arc::new(WindowLimiter::new()),
            notifier,
        ))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn RecordStore>,
        limiter: Arc<dyn RateLimiter>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Arc<Self> {
        let dispatcher = Dispatcher::new(notifier, config.mail.admin_email.clone(), store.clone());

        Arc::new(Self {
            config,
            store,
            limiter,
            dispatcher,
        })
    }
}
