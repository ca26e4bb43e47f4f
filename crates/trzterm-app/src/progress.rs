//! Single-line transfer progress on stderr.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use trzterm_transfer::{ProgressFactory, ProgressSink};

const DEFAULT_COLUMNS: u32 = 80;
/// Room taken by everything on the line except the bar itself.
const FIXED_COLUMNS: u32 = 56;
const MIN_BAR: u32 = 8;
const MAX_BAR: u32 = 60;
const MAX_LABEL: usize = 24;

fn bar_template(columns: u32) -> String {
    let bar = columns.saturating_sub(FIXED_COLUMNS).clamp(MIN_BAR, MAX_BAR);
    format!("{{msg}} [{{bar:{bar}}}] {{bytes}}/{{total_bytes}} {{bytes_per_sec}} {{eta}}")
}

fn label(index: usize, count: usize, name: &str) -> String {
    let short: String = if name.chars().count() > MAX_LABEL {
        let tail: String = name
            .chars()
            .rev()
            .take(MAX_LABEL - 3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{tail}")
    } else {
        name.to_string()
    };
    if count > 1 {
        format!("({index}/{count}) {short}")
    } else {
        short
    }
}

pub struct TextProgress {
    bar: ProgressBar,
    columns: u32,
    count: usize,
    index: usize,
}

impl TextProgress {
    fn new(columns: u32) -> Self {
        Self {
            bar: ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr()),
            columns,
            count: 0,
            index: 0,
        }
    }

    fn apply_style(&self) {
        let style = ProgressStyle::with_template(&bar_template(self.columns))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        self.bar.set_style(style);
    }
}

impl ProgressSink for TextProgress {
    fn on_count(&mut self, count: usize) {
        self.count = count;
        self.apply_style();
    }

    fn on_name(&mut self, name: &str) {
        self.index += 1;
        self.bar.set_message(label(self.index, self.count, name));
    }

    fn on_size(&mut self, size: u64) {
        self.bar.reset();
        self.bar.set_length(size);
        self.bar.set_position(0);
    }

    fn on_step(&mut self, step: u64) {
        self.bar.set_position(step);
    }

    fn on_done(&mut self) {
        self.bar.finish_and_clear();
    }

    fn on_width_hint(&mut self, columns: u32) {
        self.columns = columns;
        self.apply_style();
    }
}

/// Sizes bars from the local terminal until the remote says otherwise.
pub struct TextProgressFactory;

impl ProgressFactory for TextProgressFactory {
    fn create(&self) -> Box<dyn ProgressSink> {
        let columns = crate::terminal::size()
            .map(|(_, cols)| cols as u32)
            .unwrap_or(DEFAULT_COLUMNS);
        Box::new(TextProgress::new(columns))
    }
}
