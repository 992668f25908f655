/// The warehouse-side coordinates a mapping writes to, shared by every
/// checkpoint and every opened channel for that mapping (§3, §6).
#[derive(Debug, Clone)]
pub struct MappingIdentity {
    pub source_namespace: String,
    pub source_name: String,
    pub target_db: String,
    pub target_schema: String,
    pub target_table: String,
}
