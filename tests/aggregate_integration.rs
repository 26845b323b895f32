//! Combine-and-split tests over real files on disk.

mod common;

use std::fs;

use esm_sweep::aggregate::{combine, write_split_outputs, SourceSpec};

use common::temp_project;

const GRID_RESULTS: &str = "\
case,scenario,db,quantity,tech,period,value
0,grid,2050_grid_0,LCOE,,,48.5
0,grid,2050_grid_0,emissions_by_year,,2030,120.0
1,grid,2050_grid_1,LCOE,,,51.2
";

const ISLAND_RESULTS: &str = "\
case,scenario,db,quantity,tech,period,value
0,island,2050_island_0,LCOE,,,62.0
1,island,2050_island_1,costs_by_year,ELC_SOLAR,2030,14.5
";

#[test]
fn combine_stamps_provenance_and_keeps_duplicates() {
    let dir = temp_project("combine_provenance");
    let grid_path = dir.join("MonteCarloResults_grid.csv");
    let island_path = dir.join("MonteCarloResults_island.csv");
    fs::write(&grid_path, GRID_RESULTS).expect("write grid source");
    fs::write(&island_path, ISLAND_RESULTS).expect("write island source");

    let sources = vec![
        SourceSpec {
            path: grid_path,
            provenance: vec![
                ("decarb".to_string(), "2050".to_string()),
                ("bio".to_string(), "High Bio".to_string()),
            ],
        },
        SourceSpec {
            path: island_path,
            provenance: vec![
                ("decarb".to_string(), "2050".to_string()),
                ("bio".to_string(), "Low Bio".to_string()),
            ],
        },
    ];

    let combined = combine(&sources).expect("combine succeeds");
    assert_eq!(combined.rows.len(), 5);
    assert!(combined.header.contains(&"decarb".to_string()));
    assert!(combined.header.contains(&"bio".to_string()));

    // Both sources carry a case 0 LCOE row; concatenation keeps both,
    // distinguishable only by their provenance columns.
    let bio_idx = combined
        .column_index("bio")
        .expect("provenance column exists");
    let quantity_idx = combined.column_index("quantity").expect("quantity column");
    let lcoe_bios: Vec<&str> = combined
        .rows
        .iter()
        .filter(|r| r[quantity_idx] == "LCOE")
        .map(|r| r[bio_idx].as_str())
        .collect();
    assert_eq!(lcoe_bios.len(), 3);
    assert!(lcoe_bios.contains(&"High Bio"));
    assert!(lcoe_bios.contains(&"Low Bio"));
}

#[test]
fn split_writes_one_disjoint_file_per_quantity() {
    let dir = temp_project("split_outputs");
    let source_path = dir.join("MonteCarloResults_grid.csv");
    fs::write(&source_path, GRID_RESULTS).expect("write source");

    let combined = combine(&[SourceSpec {
        path: source_path,
        provenance: Vec::new(),
    }])
    .expect("combine succeeds");

    let out_dir = dir.join("out");
    fs::create_dir_all(&out_dir).expect("create out dir");
    let written = write_split_outputs(&combined, &out_dir).expect("split writes");

    assert!(out_dir.join("combined_results.csv").exists());
    assert!(out_dir.join("LCOE.csv").exists());
    assert!(out_dir.join("emissions_by_year.csv").exists());
    assert_eq!(written.len(), 3);

    // Subsets are disjoint and jointly cover the combined table.
    let lcoe = fs::read_to_string(out_dir.join("LCOE.csv")).expect("read LCOE subset");
    let emissions =
        fs::read_to_string(out_dir.join("emissions_by_year.csv")).expect("read emissions subset");
    assert_eq!(lcoe.lines().count(), 3);
    assert_eq!(emissions.lines().count(), 2);
    assert!(!lcoe.contains("emissions_by_year"));
    assert!(!emissions.contains("LCOE"));
}
