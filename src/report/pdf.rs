use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::Local;
use printpdf::path::PaintMode;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Point, Rect, Rgb,
};

use super::{format_brl, MarketSummary};
use crate::error::{PipelineError, Result};

const PORTRAIT: (f32, f32) = (210.0, 297.0);
const LANDSCAPE: (f32, f32) = (297.0, 210.0);
const MARGIN: f32 = 10.0;
const BOTTOM_LIMIT: f32 = 20.0;
const ROW_HEIGHT: f32 = 7.0;
const PT_TO_MM: f32 = 0.3528;
const LAYER: &str = "Conteúdo";

#[derive(Clone, Copy)]
enum Align {
    Left,
    Center,
    Right,
}

struct Column {
    title: &'static str,
    width: f32,
    align: Align,
}

const CATEGORY_COLUMNS: [Column; 5] = [
    Column { title: "Categoria", width: 50.0, align: Align::Left },
    Column { title: "Média (R$)", width: 40.0, align: Align::Right },
    Column { title: "Máximo (R$)", width: 40.0, align: Align::Right },
    Column { title: "Mínimo (R$)", width: 30.0, align: Align::Right },
    Column { title: "Nº Ofertas", width: 30.0, align: Align::Right },
];

const NEIGHBORHOOD_COLUMNS: [Column; 3] = [
    Column { title: "Bairro", width: 120.0, align: Align::Left },
    Column { title: "Média (R$)", width: 40.0, align: Align::Right },
    Column { title: "Nº Ofertas", width: 30.0, align: Align::Right },
];

fn pdf_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Pdf(e.to_string())
}

fn gray(level: f32) -> Color {
    Color::Rgb(Rgb::new(level, level, level, None))
}

/// Approximate Helvetica advance width in mm. Good enough for alignment.
fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * 0.5 * PT_TO_MM
}

/// Cuts `text` so it fits in a cell `width` mm wide.
fn fit(text: &str, width: f32, size: f32) -> String {
    let max_chars = ((width - 3.0) / (size * 0.5 * PT_TO_MM)).max(1.0) as usize;
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

struct ReportWriter {
    doc: PdfDocumentReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    layer: PdfLayerReference,
    width: f32,
    height: f32,
    cursor: f32,
    page_number: usize,
    header: String,
    generated_at: String,
}

impl ReportWriter {
    fn new(header: String, generated_at: String) -> Result<Self> {
        let (width, height) = PORTRAIT;
        let (doc, page, layer) = PdfDocument::new(header.as_str(), Mm(width), Mm(height), LAYER);
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_error)?;
        let layer = doc.get_page(page).get_layer(layer);

        let mut writer = Self {
            doc,
            regular,
            bold,
            layer,
            width,
            height,
            cursor: 0.0,
            page_number: 1,
            header,
            generated_at,
        };
        writer.decorate();
        Ok(writer)
    }

    fn add_page(&mut self, (width, height): (f32, f32)) {
        let (page, layer) = self.doc.add_page(Mm(width), Mm(height), LAYER);
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.width = width;
        self.height = height;
        self.page_number += 1;
        self.decorate();
    }

    /// Header with city and timestamp, footer with the page number.
    fn decorate(&mut self) {
        self.layer.set_fill_color(gray(0.0));
        self.centered(&self.header, 14.0, self.height - 14.0, true);

        let stamp = format!("Gerado em: {}", self.generated_at);
        self.centered(&stamp, 8.0, self.height - 19.0, false);

        let footer = format!("Página {}", self.page_number);
        self.centered(&footer, 8.0, 10.0, false);

        self.cursor = self.height - 32.0;
    }

    fn centered(&self, text: &str, size: f32, y: f32, bold: bool) {
        let font = if bold { &self.bold } else { &self.regular };
        let x = ((self.width - text_width(text, size)) / 2.0).max(MARGIN);
        self.layer.use_text(text, size, Mm(x), Mm(y), font);
    }

    fn ensure_room(&mut self, needed: f32) {
        if self.cursor - needed < BOTTOM_LIMIT {
            self.add_page(PORTRAIT);
        }
    }

    fn gap(&mut self, mm: f32) {
        self.cursor -= mm;
    }

    fn section(&mut self, title: &str) {
        self.ensure_room(20.0);
        self.layer.set_fill_color(gray(0.0));
        self.layer.use_text(title, 12.0, Mm(MARGIN), Mm(self.cursor), &self.bold);
        self.cursor -= 9.0;
    }

    fn paragraph_line(&mut self, text: &str) {
        self.ensure_room(7.0);
        self.layer.set_fill_color(gray(0.0));
        self.layer.use_text(text, 11.0, Mm(MARGIN), Mm(self.cursor), &self.regular);
        self.cursor -= 7.0;
    }

    /// Bordered table; the header row repeats after a page break.
    fn table(&mut self, columns: &[Column], rows: &[Vec<String>]) {
        let header: Vec<String> = columns.iter().map(|c| c.title.to_string()).collect();

        self.ensure_room(ROW_HEIGHT * 2.0);
        self.table_row(columns, &header, true);
        for row in rows {
            if self.cursor - ROW_HEIGHT < BOTTOM_LIMIT {
                self.add_page(PORTRAIT);
                self.table_row(columns, &header, true);
            }
            self.table_row(columns, row, false);
        }
    }

    fn table_row(&mut self, columns: &[Column], cells: &[String], is_header: bool) {
        let size = 9.0;
        let top = self.cursor;
        let bottom = top - ROW_HEIGHT;
        let font = if is_header { &self.bold } else { &self.regular };

        self.layer.set_outline_color(gray(0.0));
        self.layer.set_outline_thickness(0.3);

        let mut x = MARGIN;
        for (column, cell) in columns.iter().zip(cells) {
            let right = x + column.width;

            if is_header {
                self.layer.set_fill_color(gray(0.9));
                self.layer
                    .add_rect(Rect::new(Mm(x), Mm(bottom), Mm(right), Mm(top)).with_mode(PaintMode::Fill));
            }
            self.layer.add_line(Line {
                points: vec![
                    (Point::new(Mm(x), Mm(bottom)), false),
                    (Point::new(Mm(right), Mm(bottom)), false),
                    (Point::new(Mm(right), Mm(top)), false),
                    (Point::new(Mm(x), Mm(top)), false),
                ],
                is_closed: true,
            });

            let text = fit(cell, column.width, size);
            let width = text_width(&text, size);
            let align = if is_header { Align::Center } else { column.align };
            let text_x = match align {
                Align::Left => x + 1.5,
                Align::Center => x + (column.width - width) / 2.0,
                Align::Right => right - 1.5 - width,
            };

            self.layer.set_fill_color(gray(0.0));
            self.layer.use_text(text, size, Mm(text_x), Mm(bottom + 2.2), font);
            x = right;
        }

        self.cursor = bottom;
    }

    /// Horizontal bars on a fresh landscape page, largest on top.
    fn bar_chart(&mut self, title: &str, axis_label: &str, bars: &[(String, f64)]) {
        self.add_page(LANDSCAPE);
        self.section(title);

        let max = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
        if bars.is_empty() || max <= 0.0 {
            return;
        }

        let label_width = 55.0;
        let value_width = 40.0;
        let plot_left = MARGIN + label_width;
        let plot_width = self.width - plot_left - MARGIN - value_width;
        let slot = ((self.cursor - BOTTOM_LIMIT - 12.0) / bars.len() as f32).min(18.0);
        let bar_height = slot * 0.6;
        let plot_top = self.cursor;
        let plot_bottom = plot_top - slot * bars.len() as f32;

        self.layer.set_outline_thickness(0.2);
        self.layer.set_outline_color(gray(0.85));
        for quarter in 1..=4 {
            let x = plot_left + plot_width * quarter as f32 / 4.0;
            self.layer.add_line(Line {
                points: vec![
                    (Point::new(Mm(x), Mm(plot_bottom)), false),
                    (Point::new(Mm(x), Mm(plot_top)), false),
                ],
                is_closed: false,
            });
        }

        for (i, (label, value)) in bars.iter().enumerate() {
            let top = plot_top - slot * i as f32 - (slot - bar_height) / 2.0;
            let length = (*value / max) as f32 * plot_width;
            let baseline = top - bar_height / 2.0 - 1.2;

            self.layer.set_fill_color(Color::Rgb(Rgb::new(0.53, 0.81, 0.92, None)));
            self.layer.add_rect(
                Rect::new(Mm(plot_left), Mm(top - bar_height), Mm(plot_left + length), Mm(top))
                    .with_mode(PaintMode::Fill),
            );

            self.layer.set_fill_color(gray(0.0));
            let label = fit(label, label_width, 9.0);
            let label_x = plot_left - 2.0 - text_width(&label, 9.0);
            self.layer.use_text(label, 9.0, Mm(label_x), Mm(baseline), &self.regular);
            self.layer
                .use_text(format_brl(*value), 9.0, Mm(plot_left + length + 2.0), Mm(baseline), &self.regular);
        }

        self.layer.set_outline_thickness(0.4);
        self.layer.set_outline_color(gray(0.0));
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(plot_left), Mm(plot_bottom)), false),
                (Point::new(Mm(plot_left), Mm(plot_top)), false),
            ],
            is_closed: false,
        });

        let label_x = plot_left + (plot_width - text_width(axis_label, 10.0)) / 2.0;
        self.layer
            .use_text(axis_label, 10.0, Mm(label_x), Mm(plot_bottom - 8.0), &self.regular);
        self.cursor = plot_bottom - 12.0;
    }

    fn save(self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
        self.doc.save(&mut BufWriter::new(file)).map_err(pdf_error)
    }
}

/// Writes the market report for `city` to `output`.
pub fn render(summary: &MarketSummary, city: &str, output: &Path) -> Result<()> {
    let generated_at = Local::now().format("%d/%m/%Y %H:%M:%S").to_string();
    let mut writer = ReportWriter::new(format!("Relatório de Potencial Imobiliário - {city}"), generated_at)?;

    writer.section("Sumário Executivo");
    writer.paragraph_line(&format!("- Total de ofertas válidas analisadas: {}", summary.total_offers));
    writer.paragraph_line(&format!("- Preço médio geral de oferta: {}", format_brl(summary.overall_mean)));
    writer.gap(5.0);

    writer.section("Análise de Preços por Categoria");
    let category_rows: Vec<Vec<String>> = summary
        .categories
        .iter()
        .map(|row| {
            vec![
                row.category.clone(),
                format_brl(row.stats.mean),
                format_brl(row.stats.max),
                format_brl(row.stats.min),
                row.stats.count.to_string(),
            ]
        })
        .collect();
    writer.table(&CATEGORY_COLUMNS, &category_rows);
    writer.gap(10.0);

    writer.section("Top 10 Bairros por Volume de Ofertas");
    let neighborhood_rows: Vec<Vec<String>> = summary
        .top_neighborhoods
        .iter()
        .map(|row| vec![row.name.clone(), format_brl(row.mean), row.count.to_string()])
        .collect();
    writer.table(&NEIGHBORHOOD_COLUMNS, &neighborhood_rows);

    if !summary.categories.is_empty() {
        let mut bars: Vec<(String, f64)> = summary
            .categories
            .iter()
            .map(|row| (row.category.clone(), row.stats.mean))
            .collect();
        bars.sort_by(|a, b| b.1.total_cmp(&a.1));
        writer.bar_chart("Gráfico: Preço Médio por Categoria", "Preço Médio (R$)", &bars);
    }

    writer.save(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CategoryRow, NeighborhoodRow, PriceStats};

    #[test]
    fn long_cell_text_is_cut() {
        assert_eq!(fit("Centro", 120.0, 9.0), "Centro");

        let long = "Jardim das Acácias Residencial Parque Sul Extensão Norte Quadra Dez";
        let cut = fit(long, 50.0, 9.0);
        assert!(cut.ends_with("..."));
        assert!(text_width(&cut, 9.0) <= 50.0);
    }

    #[test]
    fn renders_a_pdf_file() {
        let dir = std::env::temp_dir().join(format!("scout-pdf-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let output = dir.join("relatorio.pdf");

        let stats = |mean: f64, count: usize| PriceStats {
            mean,
            max: mean * 1.5,
            min: mean / 2.0,
            count,
        };
        let summary = MarketSummary {
            total_offers: 3,
            overall_mean: 350_000.0,
            categories: vec![
                CategoryRow {
                    category: "Apartamento".into(),
                    stats: stats(250_000.0, 1),
                },
                CategoryRow {
                    category: "Casa".into(),
                    stats: stats(400_000.0, 2),
                },
            ],
            top_neighborhoods: (0..40)
                .map(|i| NeighborhoodRow {
                    name: format!("Bairro {i}"),
                    mean: 100_000.0 + i as f64,
                    count: 40 - i,
                })
                .collect(),
        };

        render(&summary, "Itaperuna", &output).unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
