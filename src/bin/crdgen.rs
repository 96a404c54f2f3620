//! Print the MCPServer CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/mcpserver.yaml
//! ```

use kube::CustomResourceExt;
use mcp_server_operator::MCPServer;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&MCPServer::crd())?);
    Ok(())
}
