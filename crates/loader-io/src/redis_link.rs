//! The production [`ServerLink`]: a synchronous connection to a
//! Redis-protocol graph server, issuing `GRAPH.BULK` as a raw command
//! with byte-string arguments.

use loader_core::{LoaderError, ServerLink};
use redis::{Connection, RedisResult};
use tracing::warn;

pub struct RedisLink {
    connection: Connection,
}

impl RedisLink {
    /// Connects to `redis://[:password@]host:port` and verifies the
    /// connection is live before returning.
    pub fn connect(host: &str, port: u16, password: Option<&str>) -> Result<Self, LoaderError> {
        let url = match password {
            Some(p) => format!("redis://:{p}@{host}:{port}"),
            None => format!("redis://{host}:{port}"),
        };
        let client = redis::Client::open(url).map_err(|e| LoaderError::Server(e.to_string()))?;
        let mut connection = client
            .get_connection()
            .map_err(|e| LoaderError::Server(e.to_string()))?;
        let _: String = redis::cmd("PING")
            .query(&mut connection)
            .map_err(|e| LoaderError::Server(e.to_string()))?;
        Ok(Self { connection })
    }

    /// Fails fast if the target graph key already holds data, matching
    /// the loader's "never load into a non-empty graph" invariant.
    pub fn ensure_graph_is_empty(&mut self, graph_name: &str) -> Result<(), LoaderError> {
        let exists: bool = redis::cmd("EXISTS")
            .arg(graph_name)
            .query(&mut self.connection)
            .map_err(|e| LoaderError::Server(e.to_string()))?;
        if exists {
            return Err(LoaderError::GraphNotEmpty(graph_name.to_string()));
        }
        Ok(())
    }

    pub fn create_index(&mut self, graph_name: &str, label: &str, property: &str) -> Result<(), LoaderError> {
        let query = format!("CREATE INDEX ON :{label}({property})");
        self.run_query(graph_name, &query)
    }

    pub fn create_full_text_index(
        &mut self,
        graph_name: &str,
        label: &str,
        property: &str,
    ) -> Result<(), LoaderError> {
        let query = format!(
            "CALL db.idx.fulltext.createNodeIndex('{label}', '{property}')"
        );
        self.run_query(graph_name, &query)
    }

    fn run_query(&mut self, graph_name: &str, query: &str) -> Result<(), LoaderError> {
        let result: RedisResult<redis::Value> = redis::cmd("GRAPH.QUERY")
            .arg(graph_name)
            .arg(query)
            .query(&mut self.connection);
        result
            .map(|_| ())
            .map_err(|e| LoaderError::Server(e.to_string()))
    }
}

impl ServerLink for RedisLink {
    type Reply = redis::Value;

    fn send(&mut self, command: &str, args: &[Vec<u8>]) -> Result<Self::Reply, LoaderError> {
        let mut cmd = redis::cmd(command);
        for arg in args {
            cmd.arg(arg);
        }
        cmd.query(&mut self.connection).map_err(|e| {
            warn!(command, error = %e, "server rejected bulk command");
            LoaderError::Server(e.to_string())
        })
    }
}
