//! Table schema check parameters

use serde::{Deserialize, Serialize};

use super::{Validate, ValidationError, require, require_ip, require_port};

/// Lowest port a coordinator node is expected to listen on
pub const MIN_COORDINATOR_PORT: u32 = 3306;
/// Highest valid TCP port
pub const MAX_COORDINATOR_PORT: u32 = 65535;

/// Objects to check within one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckObject {
    pub dbname: String,
    pub tables: Vec<String>,
}

/// Parameters of the `table_schema_check` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCheckParams {
    /// Coordinator address
    pub host: String,
    /// Coordinator admin port
    pub port: u32,
    pub check_objects: Vec<CheckObject>,
}

impl SchemaCheckParams {
    /// All (database, object) pairs in declaration order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.check_objects.iter().flat_map(|object| {
            object
                .tables
                .iter()
                .map(move |table| (object.dbname.as_str(), table.as_str()))
        })
    }
}

impl Validate for SchemaCheckParams {
    fn validate(&self) -> Result<(), ValidationError> {
        require_ip("host", &self.host)?;
        require_port("port", self.port, MIN_COORDINATOR_PORT, MAX_COORDINATOR_PORT)?;

        if self.check_objects.is_empty() {
            return Err(ValidationError::MissingField("check_objects".to_string()));
        }

        for object in &self.check_objects {
            require("check_objects.dbname", &object.dbname)?;
            if object.tables.is_empty() {
                return Err(ValidationError::MissingField(
                    "check_objects.tables".to_string(),
                ));
            }
            for table in &object.tables {
                require("check_objects.tables", table)?;
            }
        }

        Ok(())
    }
}
