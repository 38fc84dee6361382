//! Shared fixtures for engine integration tests
//!
//! Sales cube over [Region, Month, Measure]:
//! - Region: World = North (weight 1) + South (weight 2)
//! - Month:  Year = Q1 + Q2, Q1 = Jan + Feb + Mar, Q2 = Apr
//! - Measure: Revenue, Cost, Margin, Converted (all leaves)
//!
//! Rates cube over [Month, Rate] with a single FX rate element.

#![allow(dead_code)]

use olap_common::model::{Component, Cube, Dimension, Element};
use olap_engine::{CancellationToken, Server};

pub const MONTHS: [&str; 7] = ["Year", "Q1", "Q2", "Jan", "Feb", "Mar", "Apr"];

pub fn token() -> CancellationToken {
    CancellationToken::new()
}

pub fn coord(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub async fn add_dimension(server: &Server, name: &str, elements: &[(&str, f64)]) {
    server.add_dimension(Dimension::new(name)).await.unwrap();
    for (element, weight) in elements {
        server
            .add_element(Element::new(name, *element).with_weight(*weight))
            .await
            .unwrap();
    }
}

pub async fn link(server: &Server, dimension: &str, parent: &str, children: &[&str]) {
    for child in children {
        server
            .add_component(Component::new(dimension, parent, *child))
            .await
            .unwrap();
    }
}

pub async fn populate(server: &Server) {
    add_dimension(
        server,
        "Region",
        &[("World", 1.0), ("North", 1.0), ("South", 2.0)],
    )
    .await;
    link(server, "Region", "World", &["North", "South"]).await;

    let months: Vec<(&str, f64)> = MONTHS.iter().map(|m| (*m, 1.0)).collect();
    add_dimension(server, "Month", &months).await;
    link(server, "Month", "Year", &["Q1", "Q2"]).await;
    link(server, "Month", "Q1", &["Jan", "Feb", "Mar"]).await;
    link(server, "Month", "Q2", &["Apr"]).await;

    add_dimension(
        server,
        "Measure",
        &[
            ("Revenue", 1.0),
            ("Cost", 1.0),
            ("Margin", 1.0),
            ("Converted", 1.0),
        ],
    )
    .await;

    add_dimension(server, "Rate", &[("FX", 1.0)]).await;

    server
        .add_cube(Cube::new("Sales", ["Region", "Month", "Measure"]))
        .await
        .unwrap();
    server
        .add_cube(Cube::new("Rates", ["Month", "Rate"]))
        .await
        .unwrap();
}

pub async fn sales_server() -> Server {
    let server = Server::in_memory();
    populate(&server).await;
    server
}

/// Revenue and cost for every leaf region and month
///
/// Revenue(region, month) = base * month index, cost is always 1.
pub async fn seed_leaves(server: &Server) {
    let cancel = token();
    for (region, base) in [("North", 10.0), ("South", 100.0)] {
        for (i, month) in ["Jan", "Feb", "Mar", "Apr"].iter().enumerate() {
            server
                .put(&cancel, base * (i as f64 + 1.0), "Sales", &[region, month, "Revenue"])
                .await
                .unwrap();
            server
                .put(&cancel, 1.0, "Sales", &[region, month, "Cost"])
                .await
                .unwrap();
        }
    }
}
