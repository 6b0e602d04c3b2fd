//! LocalRouterTable tests

use std::sync::Arc;

use pushgate_core::{Connection, LocalRouter, LocalRouterTable, RouteKey, SessionTable};
use pushgate_harness::MemoryConnection;

fn router_for(conn: &Arc<MemoryConnection>) -> LocalRouter {
    LocalRouter::new(conn.as_ref_dyn())
}

#[tokio::test]
async fn register_returns_replaced_router() {
    let table = LocalRouterTable::new();
    let key = RouteKey::new("alice", 1);
    let first = MemoryConnection::bound("alice", 1);
    let second = MemoryConnection::bound("alice", 1);

    assert!(table.register(&key, router_for(&first)).await.unwrap().is_none());
    let replaced = table.register(&key, router_for(&second)).await.unwrap().unwrap();

    assert_eq!(replaced.connection_id(), first.id());
    assert_eq!(table.lookup(&key).await.unwrap().unwrap().connection_id(), second.id());
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn client_types_are_separate_keys() {
    let table = LocalRouterTable::new();
    let phone = MemoryConnection::bound("alice", 1);
    let desktop = MemoryConnection::bound("alice", 2);

    table.register(&RouteKey::new("alice", 1), router_for(&phone)).await.unwrap();
    table.register(&RouteKey::new("alice", 2), router_for(&desktop)).await.unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.get(&RouteKey::new("alice", 2)).unwrap().client_type(), 2);
}

#[tokio::test]
async fn unregister_reports_presence() {
    let table = LocalRouterTable::new();
    let key = RouteKey::new("alice", 1);
    let conn = MemoryConnection::bound("alice", 1);
    table.register(&key, router_for(&conn)).await.unwrap();

    assert!(table.unregister(&key).await.unwrap());
    assert!(!table.unregister(&key).await.unwrap());
    assert!(table.is_empty());
}

#[tokio::test]
async fn unregister_if_spares_successor() {
    let table = LocalRouterTable::new();
    let key = RouteKey::new("alice", 1);
    let stale = MemoryConnection::bound("alice", 1);
    let current = MemoryConnection::bound("alice", 1);
    table.register(&key, router_for(&stale)).await.unwrap();
    table.register(&key, router_for(&current)).await.unwrap();

    assert!(!table.unregister_if(&key, stale.id()));
    assert_eq!(table.get(&key).unwrap().connection_id(), current.id());

    assert!(table.unregister_if(&key, current.id()));
    assert!(table.get(&key).is_none());
}
