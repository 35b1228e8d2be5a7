use crate::config::Config;
use crate::models::create_schema;

/// Create the job tables, if missing.
pub async fn init_database(config: &Config) -> Result<(), String> {
    let conn = &mut config
        .database_connection()
        .await
        .map_err(|e| format!("failed to open database: {:?}", e))?;
    create_schema(conn)
        .await
        .map_err(|e| format!("failed to create tables: {}", e))?;
    Ok(())
}
