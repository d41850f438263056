use std::sync::Arc;

use urlfilter_core::{
    Cardinality, DescribeBuilder, Error, Expr, FetchGraph, FieldRef, FilterCompiler, QueryParams,
    SchemaRegistry, UrlMapper, Value, ValueType,
};

const SCHEMA: &str = r#"
entities:
  users:
    table: users
    fields:
      id: { kind: scalar, type: long }
      name: { kind: scalar, type: string }
      active: { kind: scalar, type: bool, column: is_active }
      orders:
        kind: relation
        target: orders
        cardinality: to_many
        local_key: id
        foreign_key: user_id
      roles:
        kind: relation
        target: roles
        cardinality: to_many
        local_key: id
        foreign_key: id
        via: { table: user_roles, source_key: user_id, target_key: role_id }
  orders:
    table: orders
    fields:
      id: { kind: scalar, type: integer }
      total: { kind: scalar, type: long }
      user:
        kind: relation
        target: users
        cardinality: to_one
        local_key: user_id
        foreign_key: id
  roles:
    table: roles
    primary_key: id
    fields:
      id: { kind: scalar, type: long }
      code: { kind: scalar, type: string }
"#;

fn registry() -> Arc<SchemaRegistry> {
    Arc::new(serde_yaml::from_str(SCHEMA).expect("schema parses"))
}

fn params(pairs: &[(&str, &str)]) -> QueryParams {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn yaml_registry_loads_relations_and_aliases() {
    let reg = registry();
    let users = reg.schema("users").unwrap();
    assert_eq!(users.name(), "users");
    let roles = users.field("roles").unwrap();
    let rel = roles.relation().unwrap();
    assert_eq!(rel.cardinality, Cardinality::ToMany);
    assert_eq!(rel.via.as_ref().unwrap().table, "user_roles");
    assert_eq!(
        users.field("active").unwrap().value_type(),
        Some(ValueType::Boolean)
    );
    assert_eq!(users.field("active").unwrap().column(), Some("is_active"));
    assert_eq!(
        reg.schema("orders").unwrap().field("id").unwrap().value_type(),
        Some(ValueType::Long)
    );
}

#[test]
fn dangling_relation_target_is_rejected_at_load() {
    let yaml = r#"
entities:
  users:
    table: users
    fields:
      team:
        kind: relation
        target: teams
        cardinality: to_one
        local_key: team_id
        foreign_key: id
"#;
    let err = serde_yaml::from_str::<SchemaRegistry>(yaml).unwrap_err();
    assert!(err.to_string().contains("unknown entity `teams`"), "{err}");
}

#[test]
fn many_to_many_path_compiles() {
    let reg = registry();
    let users = reg.schema("users").unwrap();
    let mut b = DescribeBuilder::new();
    let expr = FilterCompiler::new(&reg, users)
        .compile(
            &params(&[("f_roles.code", "admin,ops"), ("f_roles.code_op", "in")]),
            &mut b,
        )
        .unwrap();
    assert_eq!(
        expr,
        Some(Expr::In(
            FieldRef::new("roles.code"),
            vec![Value::String("admin".into()), Value::String("ops".into())]
        ))
    );
    assert_eq!(b.traversals(), 1);
}

#[test]
fn cyclic_path_and_graph() {
    let reg = registry();
    let orders = reg.schema("orders").unwrap();
    let mut b = DescribeBuilder::new();
    let p = params(&[
        ("f_user.orders.total", "10,20"),
        ("f_user.orders.total_op", "between"),
        ("embedded", "user.orders,user.roles"),
    ]);
    let expr = FilterCompiler::new(&reg, orders)
        .with_mapper(UrlMapper::V1)
        .compile(&p, &mut b)
        .unwrap()
        .unwrap();
    assert_eq!(expr.to_string(), "user.orders.total between 10 and 20");
    assert_eq!(b.traversals(), 2);

    let graph = FetchGraph::from_params(&p, orders, &reg).unwrap();
    assert_eq!(graph.to_string(), "user(orders, roles)");
}

#[test]
fn embedded_scalar_is_a_graph_error() {
    let reg = registry();
    let users = reg.schema("users").unwrap();
    let err = FetchGraph::from_params(&params(&[("embedded", "orders.total")]), users, &reg)
        .unwrap_err();
    assert!(matches!(err, Error::GraphResolution { .. }));
    assert_eq!(err.err_def().status, 400);
}
