use std::collections::{HashMap, HashSet};

use sysinfo::System;

use crate::debug::debug_log;

/// Forcefully stops a process together with everything it spawned.
///
/// Delivery is fire-and-forget: failures (the process is already gone, or is
/// a zombie) are swallowed and nothing waits for confirmation.
pub trait ProcessTerminator: Send + Sync {
    fn terminate_tree(&self, pid: u32);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTerminator;

impl ProcessTerminator for SystemTerminator {
    fn terminate_tree(&self, pid: u32) {
        terminate_process_tree(pid);
    }
}

pub fn terminate_process_tree(pid: u32) {
    if pid == 0 {
        return;
    }
    let mut system = System::new();
    system.refresh_processes();
    let parents: Vec<(u32, u32)> = system
        .processes()
        .iter()
        .filter_map(|(child, process)| {
            process
                .parent()
                .map(|parent| (child.as_u32(), parent.as_u32()))
        })
        .collect();

    let victims = descendants(pid, &parents);
    debug_log(format!("process: killing {pid} and descendants {victims:?}"));
    for victim in victims {
        kill(&system, victim);
    }
    kill(&system, pid);
    #[cfg(unix)]
    kill_group(pid);
}

/// Every descendant of `root`, ordered so that each process comes before its
/// parent. `root` itself is not included.
pub fn descendants(root: u32, parents: &[(u32, u32)]) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(child, parent) in parents {
        if child != parent {
            children.entry(parent).or_default().push(child);
        }
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }

    let mut ordered = Vec::new();
    let mut visited = HashSet::new();
    visited.insert(root);
    collect_post_order(root, &children, &mut visited, &mut ordered);
    ordered
}

fn collect_post_order(
    pid: u32,
    children: &HashMap<u32, Vec<u32>>,
    visited: &mut HashSet<u32>,
    out: &mut Vec<u32>,
) {
    let Some(list) = children.get(&pid) else {
        return;
    };
    for &child in list {
        if !visited.insert(child) {
            continue;
        }
        collect_post_order(child, children, visited, out);
        out.push(child);
    }
}

#[cfg(unix)]
fn kill(_system: &System, pid: u32) {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return;
    };
    // ESRCH for processes that already exited is expected and ignored.
    unsafe {
        libc::kill(raw, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill(system: &System, pid: u32) {
    if let Some(process) = system.process(sysinfo::Pid::from_u32(pid)) {
        let _ = process.kill();
    }
}

// Players are spawned as process-group leaders, so the group sweep also
// catches children that were reparented before enumeration.
#[cfg(unix)]
fn kill_group(pid: u32) {
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return;
    };
    unsafe {
        libc::killpg(raw, libc::SIGKILL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_come_before_parents() {
        // 10 -> 11 -> 13, 10 -> 12, 99 unrelated
        let parents = [(11, 10), (12, 10), (13, 11), (99, 1)];
        let order = descendants(10, &parents);
        assert_eq!(order, vec![13, 11, 12]);
    }

    #[test]
    fn leaf_has_no_descendants() {
        assert!(descendants(5, &[(6, 1)]).is_empty());
    }

    #[test]
    fn tolerates_cycles_in_parent_table() {
        let parents = [(2, 1), (1, 2)];
        assert_eq!(descendants(1, &parents), vec![2]);
    }

    #[test]
    fn terminating_missing_pid_is_silent() {
        terminate_process_tree(0);
        terminate_process_tree(u32::MAX - 1);
    }

    #[cfg(unix)]
    fn alive(system: &System, pid: u32) -> bool {
        system
            .process(sysinfo::Pid::from_u32(pid))
            .map_or(false, |p| p.status() != sysinfo::ProcessStatus::Zombie)
    }

    #[cfg(unix)]
    #[test]
    fn kills_spawned_tree() {
        use std::process::Command;
        use std::time::{Duration, Instant};

        let mut child = Command::new("sh")
            .arg("-c")
            .arg("sleep 30 & sleep 31 & wait")
            .spawn()
            .expect("spawn sh");
        let pid = child.id();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut found = Vec::new();
        while Instant::now() < deadline {
            let mut system = System::new();
            system.refresh_processes();
            let parents: Vec<(u32, u32)> = system
                .processes()
                .iter()
                .filter_map(|(c, p)| p.parent().map(|parent| (c.as_u32(), parent.as_u32())))
                .collect();
            found = descendants(pid, &parents);
            if found.len() >= 2 {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert_eq!(found.len(), 2, "sleep children never appeared: {found:?}");

        terminate_process_tree(pid);
        let status = child.wait().expect("wait for sh");
        assert!(!status.success());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut survivors = found.clone();
        while Instant::now() < deadline {
            let mut system = System::new();
            system.refresh_processes();
            survivors.retain(|p| alive(&system, *p));
            if survivors.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(survivors.is_empty(), "descendants still running: {survivors:?}");
    }
}
