//! The reconciliation loop.
//!
//! One cycle: fetch the topology, then per tab resolve the directory,
//! classify the foreground command, derive the color, diff against the
//! last-applied state, and write only what changed. Cycles are strictly
//! sequential; the loop sleeps between them on the adaptive schedule from
//! [`crate::backoff`].
//!
//! Error policy: nothing a single tab does may abort the cycle, and nothing
//! a single cycle does may abort the loop. Channel failures are logged and
//! retried on the next cycle with no backlog kept.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use tint_core::colors;
use tint_core::command::{self, ProcessTable};
use tint_core::config::Config;
use tint_core::title::{self, TitleCache};

use crate::backoff::{self, PollPolicy, PollState};
use crate::kitty::{ControlChannel, KittyTab, Topology};
use crate::resolver::CwdResolver;

/// Granularity of the interruptible sleep between cycles.
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

pub struct Reconciler<C: ControlChannel> {
    channel: C,
    config: Config,
    resolver: CwdResolver,
    cache: TitleCache,
}

impl<C: ControlChannel> Reconciler<C> {
    pub fn new(channel: C, config: Config, resolver: CwdResolver) -> Self {
        Self {
            channel,
            config,
            resolver,
            cache: TitleCache::new(),
        }
    }

    /// Runs until `shutdown` is set. The first cycle starts immediately so
    /// a fresh daemon labels tabs without waiting out a full interval; an
    /// in-flight cycle always finishes before the loop returns.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let policy = PollPolicy::from_config(&self.config.behavior);
        let mut state = PollState::new(policy);

        while !shutdown.load(Ordering::Relaxed) {
            let changes = self.cycle(shutdown);
            state = backoff::next_interval(changes > 0, state, policy);
            debug!(
                changes,
                interval_secs = state.interval.as_secs(),
                "cycle finished"
            );
            if !sleep_interruptible(state.interval, shutdown) {
                break;
            }
        }
    }

    /// One full pass over the topology. Returns the number of tabs whose
    /// rendered state actually changed.
    pub fn cycle(&mut self, shutdown: &AtomicBool) -> usize {
        let topology = match self.channel.fetch_topology() {
            Ok(topology) => topology,
            Err(err) => {
                warn!(error = %err, "topology fetch failed; retrying next cycle");
                return 0;
            }
        };

        debug!(
            os_windows = topology.os_windows.len(),
            captured_at = %topology.captured_at,
            "topology fetched"
        );
        let table = build_process_table(&topology);
        let mut live = HashSet::new();
        let mut changes = 0;

        for os_window in &topology.os_windows {
            for (position, tab) in os_window.tabs.iter().enumerate() {
                live.insert(tab.id);
                // Finish the in-flight write, but start nothing new once a
                // termination signal arrived.
                if shutdown.load(Ordering::Relaxed) {
                    return changes;
                }
                if self.reconcile_tab(tab, position + 1, &table) {
                    changes += 1;
                }
            }
        }

        self.cache.evict_absent(&live);
        changes
    }

    fn reconcile_tab(&mut self, tab: &KittyTab, index: usize, table: &ProcessTable) -> bool {
        let window = tab.windows.first();
        let reported = window.map(|w| w.cwd.as_str()).unwrap_or("");
        let root_pid = window
            .and_then(|w| w.foreground_processes.first())
            .and_then(|p| p.pid_u32());

        let resolved = self.resolver.resolve(tab.id, root_pid, reported);
        debug!(tab = tab.id, tier = ?resolved.tier, "working directory resolved");
        let cwd = title::normalize_cwd(&resolved.path).to_string();
        if cwd.is_empty() {
            debug!(tab = tab.id, title = %tab.title, "no working directory; skipping");
            return false;
        }

        let behavior = &self.config.behavior;
        let label = if behavior.show_commands {
            let roots: Vec<u32> = window
                .map(|w| {
                    w.foreground_processes
                        .iter()
                        .filter_map(|p| p.pid_u32())
                        .collect()
                })
                .unwrap_or_default();
            command::resolve_label(table, &roots, &self.config.filters, behavior.max_cmd_length)
        } else {
            None
        };

        let color = colors::color_for_path(&cwd, &self.config.colors.palette).to_string();
        let dir = title::display_dir(&cwd, behavior.max_dir_length);
        let marker = tab
            .is_focused
            .then_some(self.config.active_tab.marker.as_str())
            .filter(|marker| !marker.is_empty());
        let index = behavior.show_tab_index.then_some(index);
        let rendered = title::compose_title(index, &dir, label.as_deref(), marker);

        if !self.cache.should_apply(tab.id, &rendered, &color) {
            return false;
        }
        match self.channel.apply(tab.id, &rendered, &color) {
            Ok(()) => {
                self.cache.record(tab.id, rendered, color);
                true
            }
            Err(err) => {
                // Retried next cycle as a fresh diff; other tabs proceed.
                warn!(tab = tab.id, error = %err, "failed to apply tab attributes");
                false
            }
        }
    }
}

fn build_process_table(topology: &Topology) -> ProcessTable {
    ProcessTable::from_records(
        topology
            .os_windows
            .iter()
            .flat_map(|os_window| &os_window.tabs)
            .flat_map(|tab| &tab.windows)
            .flat_map(|window| &window.foreground_processes)
            .filter_map(|process| process.to_record()),
    )
}

/// Sleeps for `total`, waking early when `shutdown` is set. Returns false
/// when the sleep was interrupted.
fn sleep_interruptible(total: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;

    use crate::kitty::{ChannelError, ForegroundProcess, KittyWindow, OsWindow};

    #[derive(Clone, Default)]
    struct FakeChannel {
        topologies: Arc<Mutex<VecDeque<Topology>>>,
        applied: Arc<Mutex<Vec<(u64, String, String)>>>,
        fail_tabs: HashSet<u64>,
    }

    impl FakeChannel {
        fn push_topology(&self, topology: Topology) {
            self.topologies.lock().unwrap().push_back(topology);
        }

        fn applied(&self) -> Vec<(u64, String, String)> {
            self.applied.lock().unwrap().clone()
        }
    }

    impl ControlChannel for FakeChannel {
        fn fetch_topology(&mut self) -> Result<Topology, ChannelError> {
            self.topologies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(ChannelError::Timeout)
        }

        fn apply(&mut self, tab_id: u64, title: &str, color: &str) -> Result<(), ChannelError> {
            if self.fail_tabs.contains(&tab_id) {
                return Err(ChannelError::CommandFailed("boom".to_string()));
            }
            self.applied
                .lock()
                .unwrap()
                .push((tab_id, title.to_string(), color.to_string()));
            Ok(())
        }
    }

    fn process(pid: i64, ppid: Option<i64>, cmdline: &[&str]) -> ForegroundProcess {
        ForegroundProcess {
            pid: Some(pid),
            ppid,
            cmdline: cmdline.iter().map(|s| s.to_string()).collect(),
            cwd: None,
        }
    }

    fn tab(id: u64, cwd: &str, focused: bool, processes: Vec<ForegroundProcess>) -> KittyTab {
        KittyTab {
            id,
            title: String::new(),
            is_focused: focused,
            windows: vec![KittyWindow {
                cwd: cwd.to_string(),
                foreground_processes: processes,
            }],
        }
    }

    fn topology(tabs: Vec<KittyTab>) -> Topology {
        Topology {
            captured_at: Utc::now(),
            os_windows: vec![OsWindow { tabs }],
        }
    }

    fn reconciler(channel: FakeChannel) -> Reconciler<FakeChannel> {
        let mut config = Config::default();
        config.active_tab.marker = String::new();
        Reconciler::new(channel, config, CwdResolver::new(None))
    }

    fn no_shutdown() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn first_cycle_applies_every_tab_and_repeat_applies_none() {
        let channel = FakeChannel::default();
        let tabs = vec![
            tab(1, "/home/user/alpha", true, vec![process(10, None, &["zsh"])]),
            tab(2, "/home/user/beta", false, vec![]),
        ];
        channel.push_topology(topology(tabs.clone()));
        channel.push_topology(topology(tabs));

        let shutdown = no_shutdown();
        let mut reconciler = reconciler(channel.clone());

        assert_eq!(reconciler.cycle(&shutdown), 2);
        assert_eq!(reconciler.cycle(&shutdown), 0);

        let applied = channel.applied();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].0, 1);
        assert_eq!(applied[0].1, "1: alpha");
        assert_eq!(applied[1].1, "2: beta");
    }

    #[test]
    fn command_label_appears_in_the_title() {
        let channel = FakeChannel::default();
        channel.push_topology(topology(vec![tab(
            1,
            "/home/user/project",
            false,
            vec![
                process(10, None, &["-zsh"]),
                process(20, Some(10), &["python3", "script.py"]),
            ],
        )]));

        let mut reconciler = reconciler(channel.clone());
        assert_eq!(reconciler.cycle(&no_shutdown()), 1);
        assert_eq!(channel.applied()[0].1, "1: project [script]");
    }

    #[test]
    fn show_commands_false_omits_the_label() {
        let channel = FakeChannel::default();
        channel.push_topology(topology(vec![tab(
            1,
            "/home/user/project",
            false,
            vec![process(10, None, &["nvim"])],
        )]));

        let mut config = Config::default();
        config.behavior.show_commands = false;
        config.active_tab.marker = String::new();
        let mut reconciler = Reconciler::new(channel.clone(), config, CwdResolver::new(None));
        reconciler.cycle(&no_shutdown());
        assert_eq!(channel.applied()[0].1, "1: project");
    }

    #[test]
    fn active_tab_carries_the_marker() {
        let channel = FakeChannel::default();
        channel.push_topology(topology(vec![
            tab(1, "/a", true, vec![]),
            tab(2, "/b", false, vec![]),
        ]));

        let config = Config::default();
        let mut reconciler = Reconciler::new(channel.clone(), config, CwdResolver::new(None));
        reconciler.cycle(&no_shutdown());
        let applied = channel.applied();
        assert_eq!(applied[0].1, "▶ 1: a");
        assert_eq!(applied[1].1, "2: b");
    }

    #[test]
    fn one_failing_tab_does_not_block_the_others() {
        let mut channel = FakeChannel::default();
        channel.fail_tabs.insert(1);
        let tabs = vec![tab(1, "/a", false, vec![]), tab(2, "/b", false, vec![])];
        channel.push_topology(topology(tabs.clone()));
        channel.push_topology(topology(tabs));

        let shutdown = no_shutdown();
        let mut reconciler = reconciler(channel.clone());

        assert_eq!(reconciler.cycle(&shutdown), 1);
        assert_eq!(channel.applied().len(), 1);
        assert_eq!(channel.applied()[0].0, 2);

        // The failed tab is retried as a fresh diff next cycle.
        reconciler.channel.fail_tabs.clear();
        assert_eq!(reconciler.cycle(&shutdown), 1);
        assert_eq!(channel.applied().last().unwrap().0, 1);
    }

    #[test]
    fn vanished_tab_is_evicted_and_reapplied_on_return() {
        let channel = FakeChannel::default();
        let two_tabs = vec![tab(1, "/a", false, vec![]), tab(2, "/b", false, vec![])];
        channel.push_topology(topology(two_tabs.clone()));
        channel.push_topology(topology(vec![tab(1, "/a", false, vec![])]));
        channel.push_topology(topology(two_tabs));

        let shutdown = no_shutdown();
        let mut reconciler = reconciler(channel.clone());

        assert_eq!(reconciler.cycle(&shutdown), 2);
        assert_eq!(reconciler.cycle(&shutdown), 0);
        // Tab 2 was evicted while absent, so its reappearance is a change.
        assert_eq!(reconciler.cycle(&shutdown), 1);
    }

    #[test]
    fn fetch_failure_counts_as_a_quiet_cycle() {
        let channel = FakeChannel::default();
        let mut reconciler = reconciler(channel.clone());
        assert_eq!(reconciler.cycle(&no_shutdown()), 0);
        assert!(channel.applied().is_empty());
    }

    #[test]
    fn tabs_without_a_directory_are_skipped() {
        let channel = FakeChannel::default();
        channel.push_topology(topology(vec![tab(1, "", false, vec![])]));
        let mut reconciler = reconciler(channel.clone());
        assert_eq!(reconciler.cycle(&no_shutdown()), 0);
        assert!(channel.applied().is_empty());
    }

    #[test]
    fn shutdown_mid_cycle_stops_before_the_next_tab() {
        let channel = FakeChannel::default();
        channel.push_topology(topology(vec![
            tab(1, "/a", false, vec![]),
            tab(2, "/b", false, vec![]),
        ]));
        let shutdown = AtomicBool::new(true);
        let mut reconciler = reconciler(channel.clone());
        assert_eq!(reconciler.cycle(&shutdown), 0);
        assert!(channel.applied().is_empty());
    }

    #[test]
    fn same_directory_tabs_share_a_color() {
        let channel = FakeChannel::default();
        channel.push_topology(topology(vec![
            tab(1, "/home/user/shared", false, vec![]),
            tab(2, "/home/user/shared/", false, vec![]),
        ]));
        let mut reconciler = reconciler(channel.clone());
        reconciler.cycle(&no_shutdown());
        let applied = channel.applied();
        assert_eq!(applied[0].2, applied[1].2);
    }
}
