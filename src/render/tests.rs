use super::*;

#[test]
fn table_columns_align() {
    let columns = vec!["Date".to_string(), "Squats".to_string()];
    let rows = vec![
        vec!["03-04-2024".to_string(), "30".to_string()],
        vec!["03-05-2024".to_string(), "7".to_string()],
    ];

    let table = format_table(&columns, &rows);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Date       | Squats");
    assert_eq!(lines[1], "-----------+-------");
    assert_eq!(lines[2], "03-04-2024 | 30    ");
    assert_eq!(lines[3], "03-05-2024 | 7     ");
}

#[test]
fn bar_chart_scales_to_longest_bar() {
    let x_values = vec!["Squat".to_string(), "Push Up".to_string()];
    let series = vec![Series {
        name: "Total".to_string(),
        values: vec![40.0, 20.0],
    }];

    let chart = format_bar_chart(&x_values, &series);
    let lines: Vec<&str> = chart.lines().collect();
    assert_eq!(lines[0], "Total:");
    assert!(lines[1].contains("Squat"));
    assert!(lines[1].contains(&"█".repeat(40)));
    assert!(lines[2].contains("Push Up"));
    assert!(lines[2].contains(&"█".repeat(20)));
    assert!(!lines[2].contains(&"█".repeat(21)));
}

#[test]
fn line_chart_emits_one_sparkline_per_series() {
    let x_values = vec!["03-01-2024".to_string(), "03-02-2024".to_string()];
    let series = vec![
        Series {
            name: "Squats".to_string(),
            values: vec![10.0, 30.0],
        },
        Series {
            name: "Push Up".to_string(),
            values: vec![5.0, 5.0],
        },
    ];

    let chart = format_line_chart(&x_values, &series);
    let lines: Vec<&str> = chart.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("Squats"));
    assert!(lines[0].contains("min 10, max 30"));
    assert!(lines[1].contains("Push Up"));
    assert!(lines[2].contains("03-01-2024 .. 03-02-2024"));
}

#[test]
fn flat_series_renders_lowest_level() {
    let x_values = vec!["a".to_string(), "b".to_string()];
    let series = vec![Series {
        name: "Flat".to_string(),
        values: vec![5.0, 5.0],
    }];

    let chart = format_line_chart(&x_values, &series);
    assert!(chart.starts_with("▁▁"));
}
