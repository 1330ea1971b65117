use redis::{AsyncCommands, RedisResult};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    fn fx_key(base: &str, target: &str) -> String {
        format!("fx:{}:{}", base.to_uppercase(), target.to_uppercase())
    }

    pub async fn get_fx_rate(&self, base: &str, target: &str) -> RedisResult<Option<f64>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(Self::fx_key(base, target)).await
    }

    pub async fn set_fx_rate(
        &self,
        base: &str,
        target: &str,
        rate: f64,
        ttl_seconds: u64,
    ) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(Self::fx_key(base, target), rate, ttl_seconds)
            .await
    }

    pub async fn check_rate_limit(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}
