use serde::Serialize;

use crate::error::{Result, SweeperError};
use crate::table::{Column, Table};

/// Configuration options for chart rendering
///
/// This structure contains the customizable properties of the rendered
/// bar chart.
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the graph
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the graph in pixels
    pub width: u32,

    /// Height of the graph in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    /// Creates a default configuration for chart rendering
    ///
    /// # Returns
    /// * `GraphOptions` - 800x600 pixels, rows along X and values along Y
    fn default() -> Self {
        Self {
            title: "Data Visualization".to_string(),
            x_label: "Row".to_string(),
            y_label: "Value".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// One plotted column: its values by row index, gaps where data is missing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Everything needed to draw a chart, detached from the table.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartData {
    pub rows: usize,
    pub series: Vec<Series>,
}

impl ChartData {
    /// Smallest and largest plotted value, with zero always inside the span
    /// so bars have a baseline.
    pub fn value_range(&self) -> (f64, f64) {
        let (min, max) = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().flatten())
            .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        if min == max { (min, min + 1.0) } else { (min, max) }
    }
}

/// Names of the numeric columns, in table order.
pub fn numeric_columns(table: &Table) -> Vec<String> {
    table.numeric_column_names()
}

/// The preselected chart columns: the first two numeric columns, or all of
/// them when there are fewer.
pub fn default_chart_columns(table: &Table) -> Vec<String> {
    numeric_columns(table).into_iter().take(2).collect()
}

/// Project the selected numeric columns out of the table.
///
/// # Errors
/// * [`SweeperError::NoNumericColumns`] when the table has no numeric column
/// * [`SweeperError::NoColumnsSelected`] when `selected` is empty
/// * [`SweeperError::UnknownColumn`] / [`SweeperError::NotNumeric`] for a bad name
pub fn chart_data<S: AsRef<str>>(table: &Table, selected: &[S]) -> Result<ChartData> {
    if numeric_columns(table).is_empty() {
        return Err(SweeperError::NoNumericColumns);
    }
    if selected.is_empty() {
        return Err(SweeperError::NoColumnsSelected);
    }

    let series = selected
        .iter()
        .map(|name| {
            let name = name.as_ref();
            match table.column(name) {
                Some(Column::Numeric(values)) => Ok(Series {
                    name: name.to_string(),
                    values: values.clone(),
                }),
                Some(Column::Text(_)) => Err(SweeperError::NotNumeric(name.to_string())),
                None => Err(SweeperError::UnknownColumn(name.to_string())),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ChartData {
        rows: table.row_count(),
        series,
    })
}

/// Render a grouped bar chart of the series against row index as PNG bytes.
#[cfg(feature = "web")]
pub fn render_bar_chart(data: &ChartData, options: &GraphOptions) -> Result<Vec<u8>> {
    use plotters::prelude::*;
    use std::io::Cursor;

    let (width, height) = (options.width, options.height);
    let mut pixels = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let (min_y, max_y) = data.value_range();
        let x_range = -0.5..(data.rows.max(1) as f64 - 0.5);

        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 30).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(50)
            .build_cartesian_2d(x_range, min_y..max_y)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_desc(&options.x_label)
            .y_desc(&options.y_label)
            .draw()
            .map_err(render_err)?;

        // Each row gets a 0.8-wide slot split evenly between the series
        let slot = 0.8 / data.series.len().max(1) as f64;
        for (k, series) in data.series.iter().enumerate() {
            let color = Palette99::pick(k).to_rgba();
            let offset = -0.4 + k as f64 * slot;
            chart
                .draw_series(series.values.iter().enumerate().filter_map(|(row, value)| {
                    value.map(|v| {
                        let x0 = row as f64 + offset;
                        Rectangle::new([(x0, 0.0), (x0 + slot, v)], color.filled())
                    })
                }))
                .map_err(render_err)?
                .label(series.name.clone())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }

    let image = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| SweeperError::Render("pixel buffer has the wrong size".to_string()))?;
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut png), image::ImageOutputFormat::Png)
        .map_err(render_err)?;
    Ok(png)
}

#[cfg(feature = "web")]
fn render_err<E: std::fmt::Display>(e: E) -> SweeperError {
    SweeperError::Render(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed() -> Table {
        Table::from_columns(vec![
            ("a".to_string(), Column::Numeric(vec![Some(1.0), Some(-2.0)])),
            ("label".to_string(), Column::Text(vec![Some("x".to_string()), None])),
            ("b".to_string(), Column::Numeric(vec![None, Some(5.0)])),
            ("c".to_string(), Column::Numeric(vec![Some(0.0), Some(0.0)])),
        ])
        .unwrap()
    }

    fn text_only() -> Table {
        Table::from_columns(vec![(
            "label".to_string(),
            Column::Text(vec![Some("x".to_string())]),
        )])
        .unwrap()
    }

    #[test]
    fn numeric_columns_in_table_order() {
        assert_eq!(numeric_columns(&mixed()), ["a", "b", "c"]);
        assert_eq!(default_chart_columns(&mixed()), ["a", "b"]);
    }

    #[test]
    fn default_selection_with_one_numeric_column() {
        let table = Table::from_columns(vec![
            ("t".to_string(), Column::Text(vec![None])),
            ("n".to_string(), Column::Numeric(vec![Some(1.0)])),
        ])
        .unwrap();
        assert_eq!(default_chart_columns(&table), ["n"]);
    }

    #[test]
    fn text_only_table_warns() {
        let err = chart_data(&text_only(), &["label"]).unwrap_err();
        assert!(matches!(err, SweeperError::NoNumericColumns));
        assert!(err.is_warning());
        assert!(default_chart_columns(&text_only()).is_empty());
    }

    #[test]
    fn empty_selection_warns() {
        let err = chart_data::<&str>(&mixed(), &[]).unwrap_err();
        assert!(matches!(err, SweeperError::NoColumnsSelected));
    }

    #[test]
    fn bad_selection_is_an_error() {
        assert!(matches!(
            chart_data(&mixed(), &["label"]),
            Err(SweeperError::NotNumeric(_))
        ));
        assert!(matches!(
            chart_data(&mixed(), &["zzz"]),
            Err(SweeperError::UnknownColumn(_))
        ));
    }

    #[test]
    fn chart_data_projects_selected_series() {
        let table = mixed();
        let data = chart_data(&table, &["b", "a"]).unwrap();
        assert_eq!(data.rows, 2);
        assert_eq!(data.series[0].name, "b");
        assert_eq!(data.series[0].values, vec![None, Some(5.0)]);
        assert_eq!(data.value_range(), (-2.0, 5.0));
        assert_eq!(table, mixed());
    }

    #[test]
    fn flat_series_gets_nonempty_range() {
        let data = chart_data(&mixed(), &["c"]).unwrap();
        assert_eq!(data.value_range(), (0.0, 1.0));
    }
}
