use anyhow::Result;
use lancedb::{connect, Connection};

pub async fn open_db(uri: &str) -> Result<Connection> {
    let conn = connect(uri).execute().await?;
    Ok(conn)
}
