use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    write_corpus_csv, Category, Classification, Corpus, CoreError, CumulativeSeries, TrackerSource,
};

const SVG_WIDTH: f64 = 1000.0;
const SVG_HEIGHT: f64 = 600.0;
const SVG_LEFT_MARGIN: f64 = 80.0;
const SVG_RIGHT_MARGIN: f64 = 30.0;
const SVG_TOP_MARGIN: f64 = 50.0;
const SVG_BOTTOM_MARGIN: f64 = 70.0;

pub fn category_stem(tracker: TrackerSource, category: Category) -> &'static str {
    match (tracker, category) {
        (TrackerSource::Bugzilla, Category::Miscompile) => "miscompiled",
        (TrackerSource::Github, Category::Miscompile) => "miscompile",
        (_, Category::InternalError) => "ice",
        (_, Category::Other) => "other",
    }
}

pub fn category_file_name(tracker: TrackerSource, category: Category, extension: &str) -> String {
    let stem = category_stem(tracker, category);
    match tracker {
        TrackerSource::Bugzilla => format!("{stem}-bugzilla-reports.{extension}"),
        TrackerSource::Github => format!("llvm-{stem}-issues.{extension}"),
    }
}

pub fn filtered_file_name(tracker: TrackerSource) -> &'static str {
    match tracker {
        TrackerSource::Bugzilla => "filtered-bugzilla-reports.csv",
        TrackerSource::Github => "llvm-filtered-issues.csv",
    }
}

pub fn plot_file_name(tracker: TrackerSource) -> &'static str {
    match tracker {
        TrackerSource::Bugzilla => "cumulative_bugzilla_reports.svg",
        TrackerSource::Github => "cumulative_llvm_github_issues.svg",
    }
}

fn plot_title(tracker: TrackerSource) -> &'static str {
    match tracker {
        TrackerSource::Bugzilla => "Cumulative Number of Bugzilla Reports Over Time",
        TrackerSource::Github => "Cumulative Number of LLVM GitHub Issues Over Time",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

/// Fully rendered outputs, held in memory until every pipeline has succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportBundle {
    files: Vec<RenderedFile>,
}

impl ReportBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file_name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.push(RenderedFile {
            file_name: file_name.into(),
            contents: contents.into(),
        });
    }

    pub fn extend(&mut self, other: ReportBundle) {
        self.files.extend(other.files);
    }

    pub fn files(&self) -> &[RenderedFile] {
        &self.files
    }

    pub fn file(&self, file_name: &str) -> Option<&RenderedFile> {
        self.files.iter().find(|file| file.file_name == file_name)
    }

    pub fn write_to(&self, output_dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
        std::fs::create_dir_all(output_dir)
            .map_err(|error| CoreError::file_access(output_dir, "create output directory", error))?;

        let mut written = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let path = output_dir.join(&file.file_name);
            std::fs::write(&path, &file.contents)
                .map_err(|error| CoreError::file_access(&path, "write report", error))?;
            written.push(path);
        }

        info!(files = written.len(), dir = %output_dir.display(), "wrote report files");
        Ok(written)
    }
}

/// One `1. <link>` line per record, ascending by id.
pub fn render_link_list(corpus: &Corpus, link_base: &str) -> String {
    corpus
        .sorted_by_id()
        .into_iter()
        .fold(String::new(), |mut out, record| {
            let _ = writeln!(out, "1. {link_base}{}", record.id);
            out
        })
}

pub fn render_tracker_report(
    tracker: TrackerSource,
    link_base: &str,
    reconciled: &Corpus,
    classification: &Classification,
    series: &CumulativeSeries,
) -> Result<ReportBundle, CoreError> {
    let mut bundle = ReportBundle::new();
    bundle.push(filtered_file_name(tracker), write_corpus_csv(reconciled, tracker)?);

    for (category, corpus) in classification.buckets() {
        bundle.push(
            category_file_name(tracker, category, "csv"),
            write_corpus_csv(corpus, tracker)?,
        );
        bundle.push(
            category_file_name(tracker, category, "md"),
            render_link_list(corpus, link_base),
        );
    }

    bundle.push(
        plot_file_name(tracker),
        render_cumulative_svg(series, plot_title(tracker)),
    );
    Ok(bundle)
}

/// Line chart of the cumulative series with x proportional to calendar date.
pub fn render_cumulative_svg(series: &CumulativeSeries, title: &str) -> String {
    let plot_width = SVG_WIDTH - SVG_LEFT_MARGIN - SVG_RIGHT_MARGIN;
    let plot_height = SVG_HEIGHT - SVG_TOP_MARGIN - SVG_BOTTOM_MARGIN;
    let x_axis_y = SVG_TOP_MARGIN + plot_height;
    let right_edge = SVG_LEFT_MARGIN + plot_width;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{SVG_WIDTH}\" height=\"{SVG_HEIGHT}\" viewBox=\"0 0 {SVG_WIDTH} {SVG_HEIGHT}\">"
    );
    let _ = writeln!(
        svg,
        "<rect x=\"0\" y=\"0\" width=\"{SVG_WIDTH}\" height=\"{SVG_HEIGHT}\" fill=\"#ffffff\"/>"
    );
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"30\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"18\">{}</text>",
        SVG_WIDTH / 2.0,
        xml_escape(title)
    );
    let _ = writeln!(
        svg,
        "<line x1=\"{SVG_LEFT_MARGIN}\" y1=\"{x_axis_y}\" x2=\"{right_edge}\" y2=\"{x_axis_y}\" stroke=\"#333333\"/>"
    );
    let _ = writeln!(
        svg,
        "<line x1=\"{SVG_LEFT_MARGIN}\" y1=\"{SVG_TOP_MARGIN}\" x2=\"{SVG_LEFT_MARGIN}\" y2=\"{x_axis_y}\" stroke=\"#333333\"/>"
    );
    let _ = writeln!(
        svg,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"14\">Date</text>",
        SVG_LEFT_MARGIN + plot_width / 2.0,
        SVG_HEIGHT - 15.0
    );
    let _ = writeln!(
        svg,
        "<text x=\"20\" y=\"{:.1}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"14\" transform=\"rotate(-90 20 {:.1})\">Cumulative Count of Reports</text>",
        SVG_TOP_MARGIN + plot_height / 2.0,
        SVG_TOP_MARGIN + plot_height / 2.0
    );

    if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
        let span_days = (last - first).num_days().max(1) as f64;
        let max_count = series.final_count().max(1) as f64;

        let coordinates = series
            .points()
            .iter()
            .map(|point| {
                let offset = (point.date - first).num_days() as f64 / span_days;
                let x = SVG_LEFT_MARGIN + plot_width * offset;
                let y = x_axis_y - plot_height * (point.cumulative as f64 / max_count);
                format!("{x:.2},{y:.2}")
            })
            .collect::<Vec<_>>()
            .join(" ");

        let _ = writeln!(
            svg,
            "<polyline fill=\"none\" stroke=\"#1f77b4\" stroke-width=\"2\" points=\"{coordinates}\"/>"
        );
        let _ = writeln!(
            svg,
            "<text x=\"{SVG_LEFT_MARGIN}\" y=\"{:.1}\" text-anchor=\"start\" font-family=\"sans-serif\" font-size=\"12\">{first}</text>",
            x_axis_y + 20.0
        );
        let _ = writeln!(
            svg,
            "<text x=\"{right_edge}\" y=\"{:.1}\" text-anchor=\"end\" font-family=\"sans-serif\" font-size=\"12\">{last}</text>",
            x_axis_y + 20.0
        );
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-family=\"sans-serif\" font-size=\"12\">{}</text>",
            SVG_LEFT_MARGIN - 8.0,
            SVG_TOP_MARGIN + 4.0,
            series.final_count()
        );
    } else {
        let _ = writeln!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"14\">no reports</text>",
            SVG_LEFT_MARGIN + plot_width / 2.0,
            SVG_TOP_MARGIN + plot_height / 2.0
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
