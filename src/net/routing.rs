//! Dragonfly 路由
//!
//! 无路由表：下一跳由路由器编号与组算术闭式求出。
//! 最小 / 非最小 / UGAL 自适应共用一个下一跳选择函数。

use super::message::{LastHop, PathType, TerminalMsg};
use super::params::DragonflyParams;
use super::router::RouterState;

/// 下一跳：目的终端或某个全局编号的路由器。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStop {
    Terminal,
    Router(u32),
}

/// 给定两个组，返回 src 组里持有直连 dst 组链路的那台路由器（全局编号）。
pub fn router_for_group(dest_gid: usize, src_gid: usize, num_routers: usize) -> usize {
    debug_assert_ne!(dest_gid, src_gid);
    let group_begin = src_gid * num_routers;
    let group_end = group_begin + num_routers - 1;
    let offset = dest_gid.abs_diff(src_gid);

    let half_channel = num_routers / 4;
    let index = (offset - 1) / (half_channel * num_routers);
    let offset = (offset - 1) % (half_channel * num_routers);

    if index % 2 != 0 {
        group_end - offset / half_channel
    } else {
        group_begin + offset / half_channel
    }
}

/// 本路由器的全局信道对端：按局部编号对称错开，奇数槽向前、偶数槽向后。
pub fn global_channels(router_id: usize, p: &DragonflyParams) -> Vec<u32> {
    let mut router_offset = (router_id % p.num_routers) * (p.num_global_channels / 2) + 1;
    let mut chans = Vec::with_capacity(p.num_global_channels);
    for i in 0..p.num_global_channels {
        let c = if i % 2 != 0 {
            let c = (router_id + router_offset * p.num_routers) % p.total_routers;
            router_offset += 1;
            c
        } else {
            let back = (router_offset * p.num_routers) % p.total_routers;
            (router_id + p.total_routers - back) % p.total_routers
        };
        chans.push(c as u32);
    }
    chans
}

/// 一条路径的跳数（1 = 已在目的路由器，最多 4）。
pub fn num_hops(local_router: usize, dest_router: usize, num_routers: usize) -> usize {
    if local_router == dest_router {
        return 1;
    }
    let local_grp = local_router / num_routers;
    let dest_grp = dest_router / num_routers;
    if local_grp == dest_grp {
        return 2;
    }
    let mut hops = 4;
    if router_for_group(dest_grp, local_grp, num_routers) == local_router {
        hops -= 1;
    }
    if router_for_group(local_grp, dest_grp, num_routers) == dest_router {
        hops -= 1;
    }
    hops
}

/// 按给定路径类别选下一跳。非最小路由在源组第一跳盖上中转组标记，
/// 到达中转组后清除，之后按最小路由续行。
pub fn next_stop(
    s: &RouterState,
    p: &DragonflyParams,
    msg: &mut TerminalMsg,
    path: PathType,
    dest_router_id: usize,
    intm_id: usize,
) -> NextStop {
    if dest_router_id == s.router_id as usize {
        return NextStop::Terminal;
    }

    if msg.last_hop == LastHop::Terminal
        && path == PathType::NonMinimal
        && dest_router_id / p.num_routers != s.group_id as usize
    {
        msg.intm_group_id = intm_id as i32;
    }
    if path == PathType::NonMinimal && msg.intm_group_id == s.group_id as i32 {
        msg.intm_group_id = -1;
    }

    let dest_group_id = if path == PathType::NonMinimal && msg.intm_group_id >= 0 {
        msg.intm_group_id as usize
    } else {
        dest_router_id / p.num_routers
    };

    let dest = if s.group_id as usize == dest_group_id {
        dest_router_id
    } else {
        let mut d = router_for_group(dest_group_id, s.group_id as usize, p.num_routers);
        if d == s.router_id as usize {
            // 本路由器自己持有去目的组的全局信道
            for &c in &s.global_channels {
                if c as usize / p.num_routers == dest_group_id {
                    d = c as usize;
                }
            }
        }
        d
    };
    NextStop::Router(dest as u32)
}

/// 下一跳对应的输出端口。
pub fn output_port(
    s: &RouterState,
    p: &DragonflyParams,
    msg: &TerminalMsg,
    next: NextStop,
) -> usize {
    match next {
        NextStop::Terminal => {
            p.num_routers + p.num_global_channels + msg.dest_terminal_id % p.num_cn
        }
        NextStop::Router(r) => {
            let r = r as usize;
            if r / p.num_routers != s.group_id as usize {
                let i = s
                    .global_channels
                    .iter()
                    .position(|&c| c as usize == r)
                    .expect("next stop not on a global channel");
                p.num_routers + i
            } else {
                r % p.num_routers
            }
        }
    }
}

/// UGAL：按队列占用与历史窗口给最小/非最小路径打分，低者胜；
/// 选定后把结果盖进消息，后续跳不再比较。
pub fn adaptive_route(
    s: &RouterState,
    p: &DragonflyParams,
    msg: &mut TerminalMsg,
    dest_router_id: usize,
    intm_id: usize,
) -> NextStop {
    let minimal_next = next_stop(s, p, msg, PathType::Minimal, dest_router_id, intm_id);
    let minimal_port = output_port(s, p, msg, minimal_next);
    let nonmin_next = next_stop(s, p, msg, PathType::NonMinimal, dest_router_id, intm_id);
    let nonmin_port = output_port(s, p, msg, nonmin_next);

    let min_chan = minimal_port * p.num_vcs;
    let nonmin_chan = nonmin_port * p.num_vcs;
    let min_count = s.vc_occupancy[min_chan] as i64;

    let num_min_hops = num_hops(s.router_id as usize, dest_router_id, p.num_routers) as i64;
    let intm_router = router_for_group(intm_id, s.group_id as usize, p.num_routers);
    let num_nonmin_hops = (num_hops(s.router_id as usize, intm_router, p.num_routers)
        + num_hops(intm_router, dest_router_id, p.num_routers)) as i64;
    debug_assert!(num_nonmin_hops <= 6);

    let q_sum: u64 = s
        .vc_occupancy
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != min_chan)
        .map(|(_, &o)| o as u64)
        .sum();
    let q_avg = (q_sum / (s.vc_occupancy.len() as u64 - 1)) as i64;

    let min_hist =
        (s.cur_hist_num[min_chan] + s.prev_hist_num[min_chan] / 2) as i64;
    let nonmin_hist =
        (s.cur_hist_num[nonmin_chan] + s.prev_hist_num[nonmin_chan] / 2) as i64;

    if num_min_hops * (min_count - min_hist) <= num_nonmin_hops * ((q_avg + 1) - nonmin_hist) {
        msg.path_type = PathType::Minimal;
        msg.intm_group_id = -1;
        minimal_next
    } else {
        msg.path_type = PathType::NonMinimal;
        msg.intm_group_id = intm_id as i32;
        nonmin_next
    }
}
