use std::collections::HashMap;

use crate::error::WorkflowError;
use crate::task::{Task, TaskId};

/// Arena of tasks with index adjacency lists.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
  tasks: Vec<Task>,
  index: HashMap<TaskId, usize>,
  /// task index -> indices of the tasks it depends on.
  upstream: Vec<Vec<usize>>,
  /// task index -> indices of the tasks depending on it.
  downstream: Vec<Vec<usize>>,
}

impl TaskGraph {
  /// Build a graph, checking that dependencies exist and form no cycle.
  pub fn new(tasks: Vec<Task>) -> Result<Self, WorkflowError> {
    let mut index = HashMap::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
      if index.insert(task.id.clone(), i).is_some() {
        return Err(WorkflowError::DuplicateTask(task.id.clone()));
      }
    }

    let mut upstream = vec![Vec::new(); tasks.len()];
    let mut downstream = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
      for dependency in &task.depends_on {
        let Some(&d) = index.get(dependency) else {
          return Err(WorkflowError::UnknownDependency {
            task: task.id.clone(),
            dependency: dependency.clone(),
          });
        };
        upstream[i].push(d);
        downstream[d].push(i);
      }
    }

    if let Some(cycle) = find_cycle(&tasks) {
      return Err(WorkflowError::DependencyCycle { tasks: cycle });
    }

    Ok(Self {
      tasks,
      index,
      upstream,
      downstream,
    })
  }

  pub fn len(&self) -> usize {
    self.tasks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.is_empty()
  }

  pub fn tasks(&self) -> &[Task] {
    &self.tasks
  }

  pub fn task(&self, index: usize) -> &Task {
    &self.tasks[index]
  }

  pub fn get(&self, id: &TaskId) -> Option<&Task> {
    self.index_of(id).map(|i| &self.tasks[i])
  }

  pub fn index_of(&self, id: &TaskId) -> Option<usize> {
    self.index.get(id).copied()
  }

  /// Indices of the tasks `index` depends on.
  pub fn upstream(&self, index: usize) -> &[usize] {
    &self.upstream[index]
  }

  /// Indices of the tasks depending on `index`.
  pub fn downstream(&self, index: usize) -> &[usize] {
    &self.downstream[index]
  }

  /// Tasks without dependencies, in plan order.
  pub fn entry_points(&self) -> Vec<usize> {
    (0..self.tasks.len())
      .filter(|&i| self.upstream[i].is_empty())
      .collect()
  }
}

/// Find one dependency cycle, returning the ids of the tasks on it.
///
/// Dependencies on tasks that are not in `tasks` are ignored.
pub fn find_cycle(tasks: &[Task]) -> Option<Vec<TaskId>> {
  let index: HashMap<&TaskId, usize> = tasks.iter().enumerate().map(|(i, t)| (&t.id, i)).collect();
  let edges: Vec<Vec<usize>> = tasks
    .iter()
    .map(|t| {
      t.depends_on
        .iter()
        .filter_map(|d| index.get(d).copied())
        .collect()
    })
    .collect();

  // 0 = unvisited, 1 = on the current path, 2 = done
  fn dfs(node: usize, edges: &[Vec<usize>], color: &mut [u8], path: &mut Vec<usize>) -> Option<Vec<usize>> {
    color[node] = 1;
    path.push(node);

    for &next in &edges[node] {
      match color[next] {
        1 => {
          let start = path.iter().position(|&n| n == next)?;
          return Some(path[start..].to_vec());
        }
        0 => {
          if let Some(cycle) = dfs(next, edges, color, path) {
            return Some(cycle);
          }
        }
        _ => {}
      }
    }

    path.pop();
    color[node] = 2;
    None
  }

  let mut color = vec![0u8; tasks.len()];
  let mut path = Vec::new();
  for start in 0..tasks.len() {
    if color[start] == 0
      && let Some(cycle) = dfs(start, &edges, &mut color, &mut path)
    {
      return Some(cycle.into_iter().map(|i| tasks[i].id.clone()).collect());
    }
  }
  None
}
