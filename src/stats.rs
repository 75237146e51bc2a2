// A passive observer the Engine feeds as it runs. Nothing here can
// fail or change interpreted-program behavior; it only accumulates
// counters that the driver may later format into a stats file.

use crate::program::Opcode;
use std::collections::HashMap;

/// One token of the user-requested stats schedule, in command-line
/// appearance order (see cli.rs).
#[derive(Clone, Debug)]
pub enum StatsToken {
    Insts,
    Hot,
    Vars,
    Frequent,
    Print(String),
    Eol,
}

#[derive(Default)]
pub struct StatsCollector {
    total_instructions: u64,
    opcode_counts: HashMap<Opcode, u64>,
    order_counts: HashMap<u32, u64>,
    peak_live_vars: usize,
}

impl StatsCollector {
    pub fn new() -> StatsCollector {
        StatsCollector::default()
    }

    /// Record one executed instruction. Callers must not call this
    /// for `LABEL`, which does not count toward any of these stats.
    pub fn record(&mut self, opcode: Opcode, order: u32) {
        self.total_instructions += 1;
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
        *self.order_counts.entry(order).or_insert(0) += 1;
    }

    pub fn observe_live_vars(&mut self, count: usize) {
        if count > self.peak_live_vars {
            self.peak_live_vars = count;
        }
    }

    /// The `order` value executed most often; ties broken by the
    /// numerically smallest order.
    pub fn hottest_order(&self) -> Option<u32> {
        let mut best: Option<(u32, u64)> = None;
        for (&order, &count) in &self.order_counts {
            best = Some(match best {
                None => (order, count),
                Some((bo, bc)) if count > bc || (count == bc && order < bo) => (order, count),
                Some(prev) => prev,
            });
        }
        best.map(|(order, _)| order)
    }

    /// Every opcode tied for the highest execution count, in lexical
    /// order of first occurrence in the opcode schema. If no counted
    /// instruction ever ran, `max` stays 0 and every opcode's count
    /// (also 0) ties it — so this returns the full opcode list, not
    /// an empty one; that degenerate tie is what the original's
    /// `max_opcode_frequency`-seeded-at-0 loop produces too.
    pub fn most_frequent_opcodes(&self) -> Vec<Opcode> {
        let max = self.opcode_counts.values().copied().max().unwrap_or(0);
        Opcode::ALL
            .iter()
            .map(|(_, op)| *op)
            .filter(|op| self.opcode_counts.get(op).copied().unwrap_or(0) == max)
            .collect()
    }

    pub fn total_instructions(&self) -> u64 {
        self.total_instructions
    }

    pub fn peak_live_vars(&self) -> usize {
        self.peak_live_vars
    }

    /// Render the stats file contents: tokens concatenated with no
    /// separators, in schedule order.
    pub fn report(&self, tokens: &[StatsToken]) -> String {
        let mut out = String::new();
        for token in tokens {
            match token {
                StatsToken::Insts => out.push_str(&self.total_instructions.to_string()),
                StatsToken::Hot => {
                    if let Some(order) = self.hottest_order() {
                        out.push_str(&order.to_string());
                    }
                }
                StatsToken::Vars => out.push_str(&self.peak_live_vars.to_string()),
                StatsToken::Frequent => {
                    let names: Vec<&str> =
                        self.most_frequent_opcodes().into_iter().map(Opcode::name).collect();
                    out.push_str(&names.join(","));
                }
                StatsToken::Print(s) => out.push_str(s),
                StatsToken::Eol => out.push('\n'),
            }
        }
        out
    }
}
