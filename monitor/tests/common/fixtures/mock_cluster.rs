//! Scripted in-memory cluster
//!
//! Each member address gets a [`NodeScript`] that answers every query the
//! monitor sends. Scripts can be told to fail specific queries, to become
//! unreachable, or to report a sequence of cluster roles.

use async_trait::async_trait;
use monitor::config::{ActiveGraph, Credentials, HostEnvironment, TransportOptions};
use monitor::driver::{Connection, Connector, Params, QueryResult, Record};
use monitor::errors::{MonitorError, MonitorResult};
use monitor::feed::queries::{self, diagnostics};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::test_data::{codes, query_error, result};

pub struct NodeScript {
    address: String,
    overview: Option<Vec<Record>>,
    edition: Mutex<String>,
    roles: Mutex<VecDeque<String>>,
    failing: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl NodeScript {
    pub fn new(address: &str, role: &str, overview: Option<Vec<Record>>) -> Self {
        Self {
            address: address.to_string(),
            overview,
            edition: Mutex::new("enterprise".to_string()),
            roles: Mutex::new(VecDeque::from([role.to_string()])),
            failing: Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
            delay: Mutex::new(None),
        }
    }

    /// Roles reported by successive role queries; the last one repeats
    pub fn set_roles(&self, roles: &[&str]) {
        *self.roles.lock().unwrap() = roles.iter().map(|r| r.to_string()).collect();
    }

    pub fn set_edition(&self, edition: &str) {
        *self.edition.lock().unwrap() = edition.to_string();
    }

    /// Make `query` fail with a query error until `recover` is called
    pub fn fail(&self, query: &str) {
        self.failing.lock().unwrap().insert(query.to_string());
    }

    pub fn recover(&self, query: &str) {
        self.failing.lock().unwrap().remove(query);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Every query takes this long to answer
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    fn delay(&self) -> Option<Duration> {
        *self.delay.lock().unwrap()
    }

    fn next_role(&self) -> String {
        let mut roles = self.roles.lock().unwrap();
        if roles.len() > 1 {
            roles.pop_front().unwrap()
        } else {
            roles.front().cloned().unwrap_or_else(|| "UNKNOWN".to_string())
        }
    }

    pub fn respond(&self, query: &str) -> MonitorResult<QueryResult> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(MonitorError::connectivity(&self.address, "connection refused"));
        }
        if self.failing.lock().unwrap().contains(query) {
            return Err(query_error(
                &self.address,
                query,
                codes::GENERAL_FAILURE,
                "scripted failure",
            ));
        }

        let answer = match query {
            q if q == queries::PING.query => result(&["value"], vec![vec![json!(true)]]),
            q if q == queries::CLUSTER_ROLE.query => {
                result(&["role"], vec![vec![json!(self.next_role())]])
            }
            queries::CLUSTER_OVERVIEW => match &self.overview {
                Some(rows) => QueryResult {
                    columns: rows
                        .first()
                        .map(|row| row.columns().to_vec())
                        .unwrap_or_default(),
                    records: rows.clone(),
                },
                None => {
                    return Err(query_error(
                        &self.address,
                        query,
                        codes::PROCEDURE_NOT_FOUND,
                        "There is no procedure with the name `dbms.cluster.overview` registered for this database instance.",
                    ))
                }
            },
            queries::CURRENT_USER => result(
                &["username", "roles", "flags"],
                vec![vec![json!("neo4j"), json!(["admin"]), json!([])]],
            ),
            queries::DBMS_COMPONENTS => result(
                &["name", "versions", "edition"],
                vec![vec![
                    json!("Neo4j Kernel"),
                    json!(["4.4.12"]),
                    json!(self.edition.lock().unwrap().clone()),
                ]],
            ),
            queries::NATIVE_AUTH_PROBE => result(&["value"], vec![vec![json!(1)]]),
            diagnostics::LIST_USERS => result(
                &["username", "flags", "roles"],
                vec![
                    vec![json!("neo4j"), json!([]), json!(["admin"])],
                    vec![json!("reader"), json!(["password_change_required"]), json!(["reader"])],
                ],
            ),
            diagnostics::LIST_ROLES => result(
                &["role", "users"],
                vec![vec![json!("admin"), json!(["neo4j"])]],
            ),
            diagnostics::LIST_INDEXES => result(
                &["description", "tokenNames", "properties", "state", "type", "provider"],
                vec![vec![
                    json!("INDEX ON :Person(name)"),
                    json!(["Person"]),
                    json!(["name"]),
                    json!("ONLINE"),
                    json!("BTREE"),
                    json!({"key": "native-btree", "version": "1.0"}),
                ]],
            ),
            diagnostics::LIST_CONSTRAINTS => result(
                &["description"],
                vec![vec![json!("CONSTRAINT ON ( movie:Movie ) ASSERT movie.title IS UNIQUE")]],
            ),
            diagnostics::QUERY_JMX => result(
                &["name", "attributes"],
                vec![vec![
                    json!("java.lang:type=Memory"),
                    json!({"HeapMemoryUsage": {"value": {"used": 1024}}}),
                ]],
            ),
            diagnostics::LIST_CONFIG => result(
                &["name", "value"],
                vec![
                    vec![json!("dbms.jvm.additional"), json!("-XX:+UseG1GC")],
                    vec![json!("dbms.jvm.additional"), json!("-XX:+AlwaysPreTouch")],
                    vec![json!("dbms.memory.heap.max_size"), json!("1G")],
                ],
            ),
            diagnostics::APOC_VERSION => result(&["value"], vec![vec![json!("4.4.0.8")]]),
            diagnostics::NODE_COUNT => result(&["value"], vec![vec![json!(171)]]),
            diagnostics::LABELS => result(&["value"], vec![vec![json!(["Movie", "Person"])]]),
            _ => {
                return Err(query_error(
                    &self.address,
                    query,
                    codes::GENERAL_FAILURE,
                    "unscripted query",
                ))
            }
        };
        Ok(answer)
    }
}

/// Connection answering from a [`NodeScript`], with call accounting
pub struct ScriptedConnection {
    script: Arc<NodeScript>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedConnection {
    pub fn new(script: Arc<NodeScript>) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn calls_to(&self, query: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|q| *q == query).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of concurrently running executes seen so far
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn address(&self) -> &str {
        &self.script.address
    }

    fn encrypted(&self) -> bool {
        false
    }

    async fn execute(&self, query: &str, _params: &Params) -> MonitorResult<QueryResult> {
        self.calls.lock().unwrap().push(query.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.script.delay() {
            tokio::time::sleep(delay).await;
        }
        let answer = self.script.respond(query);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }

    async fn close(&self) -> MonitorResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out one scripted connection per known address
#[derive(Default)]
pub struct MockConnector {
    connections: HashMap<String, Arc<ScriptedConnection>>,
    connects: Mutex<Vec<(String, String)>>,
}

impl MockConnector {
    pub fn add(&mut self, script: Arc<NodeScript>) -> Arc<ScriptedConnection> {
        let connection = Arc::new(ScriptedConnection::new(script.clone()));
        self.connections
            .insert(script.address.clone(), connection.clone());
        connection
    }

    /// `(address, username)` of every connect call
    pub fn connects(&self) -> Vec<(String, String)> {
        self.connects.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        address: &str,
        credentials: &Credentials,
        _options: &TransportOptions,
    ) -> MonitorResult<Arc<dyn Connection>> {
        self.connects
            .lock()
            .unwrap()
            .push((address.to_string(), credentials.username.clone()));

        match self.connections.get(address) {
            Some(connection) => Ok(connection.clone()),
            None => Err(MonitorError::connectivity(address, "connection refused")),
        }
    }
}

/// A cluster (or standalone instance) made of scripted members
pub struct MockCluster {
    pub connector: Arc<MockConnector>,
    scripts: HashMap<String, Arc<NodeScript>>,
    connections: HashMap<String, Arc<ScriptedConnection>>,
}

/// Shape of the rows returned by the cluster overview
#[derive(Clone, Copy, PartialEq)]
enum OverviewShape {
    /// No overview procedure at all
    Absent,
    /// One `role` and one `database` column per member
    SingleDatabase,
    /// A `databases` map of database name to role per member
    DatabaseMap,
}

impl MockCluster {
    /// Single instance without the cluster-overview procedure
    pub fn standalone(address: &str) -> Self {
        Self::build(&[(address, "SINGLE")], OverviewShape::Absent)
    }

    /// Cluster whose overview lists every `(address, role)` member
    pub fn cluster(members: &[(&str, &str)]) -> Self {
        Self::build(members, OverviewShape::SingleDatabase)
    }

    /// Cluster whose overview reports roles per database, as 4.x servers do
    pub fn cluster_with_database_roles(members: &[(&str, &str)]) -> Self {
        Self::build(members, OverviewShape::DatabaseMap)
    }

    fn build(members: &[(&str, &str)], shape: OverviewShape) -> Self {
        let overview = (shape != OverviewShape::Absent).then(|| {
            members
                .iter()
                .enumerate()
                .map(|(idx, &(address, role))| {
                    let host = address.split(':').next().unwrap_or(address);
                    let id = ("id", json!(format!("member-{}", idx + 1)));
                    let addresses = (
                        "addresses",
                        json!([format!("bolt://{}:7687", host), format!("http://{}", address)]),
                    );
                    match shape {
                        OverviewShape::DatabaseMap => Record::from_pairs([
                            id,
                            addresses,
                            ("databases", json!({ "system": "FOLLOWER", "neo4j": role })),
                            ("groups", json!([])),
                        ]),
                        _ => Record::from_pairs([
                            id,
                            addresses,
                            ("role", json!(role)),
                            ("database", json!("neo4j")),
                        ]),
                    }
                })
                .collect::<Vec<_>>()
        });

        let mut connector = MockConnector::default();
        let mut scripts = HashMap::new();
        let mut connections = HashMap::new();
        for &(address, role) in members {
            let script = Arc::new(NodeScript::new(address, role, overview.clone()));
            connections.insert(address.to_string(), connector.add(script.clone()));
            scripts.insert(address.to_string(), script);
        }

        Self {
            connector: Arc::new(connector),
            scripts,
            connections,
        }
    }

    pub fn script(&self, address: &str) -> &Arc<NodeScript> {
        &self.scripts[address]
    }

    pub fn connection(&self, address: &str) -> &Arc<ScriptedConnection> {
        &self.connections[address]
    }
}

/// Host environment serving a fixed active graph and context document
pub struct StaticHostEnvironment {
    pub active: Option<ActiveGraph>,
    pub context: Value,
}

#[async_trait]
impl HostEnvironment for StaticHostEnvironment {
    async fn first_active(&self) -> MonitorResult<Option<ActiveGraph>> {
        Ok(self.active.clone())
    }

    async fn context(&self) -> MonitorResult<Value> {
        Ok(self.context.clone())
    }
}
