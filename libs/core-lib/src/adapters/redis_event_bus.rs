use crate::{CoreError, EventPublisher};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, info};

/// Announces archival events over Redis pub/sub. Dashboards listen on
/// `<prefix>tenant:<slug>:z-reports`, or `<prefix>tenant:*:z-reports` with PSUBSCRIBE.
#[derive(Clone)]
pub struct RedisEventBus {
    connection: MultiplexedConnection,
    channel_prefix: String,
}

impl RedisEventBus {
    pub async fn new(redis_url: &str, channel_prefix: Option<&str>) -> Result<Self, CoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| CoreError::Configuration(format!("Invalid Redis URL: {}", e)))?;
        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        info!("Connected to Redis for Z-report announcements.");
        Ok(Self {
            connection,
            channel_prefix: channel_prefix.unwrap_or_default().to_string(),
        })
    }

    pub fn channel_for(&self, topic: &str) -> String {
        format!("{}{}", self.channel_prefix, topic)
    }
}

#[async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError> {
        let channel = self.channel_for(topic);
        let mut conn = self.connection.clone();
        let listeners: usize = conn
            .publish(&channel, event_payload)
            .await
            .map_err(|e| CoreError::Infrastructure(Box::new(e)))?;
        debug!(channel = %channel, event_type, listeners, "Published to Redis");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testcontainers::ContainerAsync;
    use testcontainers::runners::AsyncRunner;
    use testcontainers_modules::redis::Redis as RedisImage;
    use tokio::time::{Duration, timeout};
    use tokio_stream::StreamExt;

    async fn start_redis() -> (ContainerAsync<RedisImage>, String) {
        let node = RedisImage::default()
            .start()
            .await
            .expect("Failed to start Redis container");
        let port = node
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get host port");
        (node, format!("redis://localhost:{}/", port))
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_configuration_error() {
        let result = RedisEventBus::new("not a url", None).await;
        assert!(matches!(result, Err(CoreError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_dashboard_receives_tenant_announcements() {
        let (_node, url) = start_redis().await;
        let bus = RedisEventBus::new(&url, Some("vysion:")).await.unwrap();
        assert_eq!(
            bus.channel_for("tenant:dupont:z-reports"),
            "vysion:tenant:dupont:z-reports"
        );

        let mut dashboard = Client::open(url.as_str())
            .unwrap()
            .get_async_pubsub()
            .await
            .unwrap();
        dashboard.psubscribe("vysion:tenant:*:z-reports").await.unwrap();
        let mut messages = dashboard.into_on_message();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let dupont = br#"{"tenant_slug":"dupont","report_date":"2024-06-15"}"#.to_vec();
        let peeters = br#"{"tenant_slug":"peeters","report_date":"2024-06-15"}"#.to_vec();
        bus.publish("tenant:dupont:z-reports", "ZReportArchived", &dupont)
            .await
            .unwrap();
        bus.publish("tenant:peeters:z-reports", "ZReportArchived", &peeters)
            .await
            .unwrap();

        let mut received = Vec::new();
        for _ in 0..2 {
            let msg = timeout(Duration::from_secs(5), messages.next())
                .await
                .expect("timed out waiting for an announcement")
                .expect("pubsub stream ended");
            received.push((
                msg.get_channel_name().to_string(),
                msg.get_payload::<Vec<u8>>().unwrap(),
            ));
        }
        assert_eq!(
            received,
            vec![
                ("vysion:tenant:dupont:z-reports".to_string(), dupont),
                ("vysion:tenant:peeters:z-reports".to_string(), peeters),
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_without_listeners_succeeds() {
        let (_node, url) = start_redis().await;
        let bus = RedisEventBus::new(&url, None).await.unwrap();
        assert!(bus.publish("tenant:quiet:z-reports", "ZReportArchived", b"{}").await.is_ok());
    }
}
