//! Folding hydrated commits into a [`FlatLandscape`].
//!
//! Each commit becomes (part of) a city. Files, classes and functions are
//! pushed through one worklist and dispatched on their kind; directories are
//! projected on demand when a file needs its district. Every id-list append is
//! idempotent, so projecting overlapping commits never duplicates references.

use crate::store::{FunctionNode, GraphStore};
use crate::structure::error::StructureResult;
use crate::structure::landscape::{
    push_unique, stable_id, Building, City, Class, District, FlatLandscape, Func,
};
use crate::structure::loader::{HydratedClass, HydratedCommit, HydratedFile};
use std::collections::VecDeque;
use std::sync::Arc;

/// City name used when a commit belongs to no known repository
pub const UNKNOWN_APPLICATION: &str = "UnknownApplication";

const ROOT_DISTRICT_SUFFIX: &str = "-root";

enum Owner {
    Building(String),
    Class(String),
}

/// Unit of work of the projection worklist
enum Projectable<'a> {
    File(&'a HydratedFile),
    Class {
        class: &'a HydratedClass,
        building_id: String,
    },
    Function {
        function: &'a FunctionNode,
        owner: Owner,
        owner_fqn: String,
    },
}

pub struct StructureProjector {
    store: Arc<dyn GraphStore>,
}

impl StructureProjector {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Project all commits into one landscape. Commits of the same repository
    /// share their city.
    pub async fn project(
        &self,
        token: &str,
        commits: &[HydratedCommit],
    ) -> StructureResult<FlatLandscape> {
        let mut landscape = FlatLandscape::new(token);
        for commit in commits {
            let city_name = match self.store.find_repository_of_commit(commit.commit.id).await? {
                Some(repository) => repository.name,
                None => UNKNOWN_APPLICATION.to_string(),
            };
            project_commit(&mut landscape, &city_name, commit);
        }
        Ok(landscape)
    }
}

/// Project one hydrated commit into the city named `city_name`.
pub fn project_commit(landscape: &mut FlatLandscape, city_name: &str, commit: &HydratedCommit) {
    let city_id = stable_id(city_name);
    landscape
        .cities
        .entry(city_id.clone())
        .or_insert_with(|| City::new(&city_id, city_name));

    let mut queue: VecDeque<Projectable<'_>> =
        commit.files.iter().map(Projectable::File).collect();

    while let Some(item) = queue.pop_front() {
        match item {
            Projectable::File(file) => {
                let building = project_file(landscape, &city_id, commit, file);
                for class in &file.classes {
                    queue.push_back(Projectable::Class {
                        class,
                        building_id: building.id.clone(),
                    });
                }
                for function in &file.functions {
                    queue.push_back(Projectable::Function {
                        function,
                        owner: Owner::Building(building.id.clone()),
                        owner_fqn: building.fqn.clone(),
                    });
                }
            }
            Projectable::Class { class, building_id } => {
                let class_id = project_class(landscape, class, &building_id);
                for function in &class.functions {
                    queue.push_back(Projectable::Function {
                        function,
                        owner: Owner::Class(class_id.clone()),
                        owner_fqn: class.class.name.clone(),
                    });
                }
            }
            Projectable::Function {
                function,
                owner,
                owner_fqn,
            } => project_function(landscape, function, owner, &owner_fqn),
        }
    }
}

struct BuildingRef {
    id: String,
    fqn: String,
}

fn project_file(
    landscape: &mut FlatLandscape,
    city_id: &str,
    commit: &HydratedCommit,
    hydrated: &HydratedFile,
) -> BuildingRef {
    let file = &hydrated.file;
    let id = match &file.hash {
        Some(hash) => hash.clone(),
        None => format!("file-{}", file.id),
    };
    let fqn = match file.package_name.as_deref().filter(|p| !p.is_empty()) {
        Some(package) => format!("{}.{}", package, file.name),
        None => file.name.clone(),
    };

    let district_id = match commit.parent_of(file) {
        Some(_) => project_districts(landscape, city_id, commit, hydrated),
        None => root_district(landscape, city_id),
    };

    if let Some(district) = landscape.districts.get_mut(&district_id) {
        push_unique(&mut district.building_ids, &id);
    }
    if let Some(city) = landscape.cities.get_mut(city_id) {
        push_unique(&mut city.building_ids, &id);
    }
    landscape
        .buildings
        .entry(id.clone())
        .or_insert_with(|| Building {
            id: id.clone(),
            name: file.name.clone(),
            fqn: fqn.clone(),
            parent_city_id: city_id.to_string(),
            parent_district_id: district_id,
            language: file.language,
            class_ids: Vec::new(),
            function_ids: Vec::new(),
            metrics: file.metrics.clone(),
        });

    BuildingRef { id, fqn }
}

/// Mirror the directory chain above a file as districts (top-down), reusing
/// districts already projected. Returns the id of the file's own district.
fn project_districts(
    landscape: &mut FlatLandscape,
    city_id: &str,
    commit: &HydratedCommit,
    hydrated: &HydratedFile,
) -> String {
    let chain = commit.ancestors(&hydrated.file);
    let mut parent: Option<(String, String)> = None; // (district id, fqn)

    for dir in chain.iter().rev() {
        let id = dir.id.to_string();
        if let Some(existing) = landscape.districts.get(&id) {
            parent = Some((existing.id.clone(), existing.fqn.clone()));
            continue;
        }

        let fqn = match &parent {
            Some((_, parent_fqn)) => format!("{}.{}", parent_fqn, dir.name),
            None => dir.name.clone(),
        };
        let district = District {
            id: id.clone(),
            name: dir.name.clone(),
            fqn: fqn.clone(),
            parent_city_id: city_id.to_string(),
            parent_district_id: parent.as_ref().map(|(pid, _)| pid.clone()),
            district_ids: Vec::new(),
            building_ids: Vec::new(),
        };

        match &parent {
            Some((parent_id, _)) => {
                if let Some(parent_district) = landscape.districts.get_mut(parent_id) {
                    push_unique(&mut parent_district.district_ids, &id);
                }
            }
            None => {
                if let Some(city) = landscape.cities.get_mut(city_id) {
                    push_unique(&mut city.root_district_ids, &id);
                }
            }
        }
        if let Some(city) = landscape.cities.get_mut(city_id) {
            push_unique(&mut city.district_ids, &id);
        }
        landscape.districts.insert(id.clone(), district);
        parent = Some((id, fqn));
    }

    parent.map(|(id, _)| id).unwrap_or_default()
}

/// The lazily created catch-all district for files without a directory
fn root_district(landscape: &mut FlatLandscape, city_id: &str) -> String {
    let id = format!("{}{}", city_id, ROOT_DISTRICT_SUFFIX);
    if !landscape.districts.contains_key(&id) {
        landscape.districts.insert(
            id.clone(),
            District {
                id: id.clone(),
                name: "root".to_string(),
                fqn: "root".to_string(),
                parent_city_id: city_id.to_string(),
                parent_district_id: None,
                district_ids: Vec::new(),
                building_ids: Vec::new(),
            },
        );
        if let Some(city) = landscape.cities.get_mut(city_id) {
            push_unique(&mut city.root_district_ids, &id);
            push_unique(&mut city.district_ids, &id);
        }
    }
    id
}

fn project_class(landscape: &mut FlatLandscape, hydrated: &HydratedClass, building_id: &str) -> String {
    let fqn = &hydrated.class.name;
    let id = stable_id(fqn);
    let simple_name = fqn.rsplit('.').next().unwrap_or(fqn);

    if let Some(building) = landscape.buildings.get_mut(building_id) {
        push_unique(&mut building.class_ids, &id);
    }
    landscape.classes.entry(id.clone()).or_insert_with(|| Class {
        id: id.clone(),
        name: simple_name.to_string(),
        fqn: fqn.clone(),
        parent_building_id: building_id.to_string(),
        function_ids: Vec::new(),
        metrics: hydrated.class.metrics.clone(),
    });
    id
}

fn project_function(
    landscape: &mut FlatLandscape,
    function: &FunctionNode,
    owner: Owner,
    owner_fqn: &str,
) {
    let id = stable_id(&format!("{}::{}", owner_fqn, function.name));
    let parent_id = match owner {
        Owner::Building(building_id) => {
            if let Some(building) = landscape.buildings.get_mut(&building_id) {
                push_unique(&mut building.function_ids, &id);
            }
            building_id
        }
        Owner::Class(class_id) => {
            if let Some(class) = landscape.classes.get_mut(&class_id) {
                push_unique(&mut class.function_ids, &id);
            }
            class_id
        }
    };

    landscape.functions.entry(id.clone()).or_insert_with(|| Func {
        id: id.clone(),
        name: function.name.clone(),
        fqn: format!("{}.{}", owner_fqn, function.name),
        parent_id,
        metrics: function.metrics.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ClazzNode, CommitNode, DirectoryNode, FileRevisionNode, NodeId};
    use std::collections::BTreeMap;

    fn dir(id: u64, name: &str, parent: Option<u64>) -> DirectoryNode {
        let mut d = DirectoryNode::new(NodeId(id), name);
        d.parent = parent.map(NodeId);
        d
    }

    fn file(id: u64, name: &str, hash: &str, parent: Option<u64>) -> HydratedFile {
        let mut f = FileRevisionNode::new(NodeId(id), name);
        f.hash = Some(hash.to_string());
        f.parent = parent.map(NodeId);
        HydratedFile {
            file: f,
            classes: Vec::new(),
            functions: Vec::new(),
        }
    }

    fn commit(hash: &str, files: Vec<HydratedFile>, dirs: Vec<DirectoryNode>) -> HydratedCommit {
        HydratedCommit {
            commit: CommitNode::new(NodeId(1000), "tok", hash),
            files,
            directories: dirs.into_iter().map(|d| (d.id, d)).collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_two_commits_share_one_district() {
        let dirs = || vec![dir(1, "myrepo", None), dir(2, "src", Some(1))];
        let c1 = commit("c1", vec![file(10, "A.java", "h1", Some(2))], dirs());
        let c2 = commit("c2", vec![file(11, "B.java", "h2", Some(2))], dirs());

        let mut landscape = FlatLandscape::new("tok");
        project_commit(&mut landscape, "myrepo", &c1);
        project_commit(&mut landscape, "myrepo", &c2);

        assert_eq!(landscape.cities.len(), 1);
        assert_eq!(landscape.districts.len(), 2);
        let src = &landscape.districts["2"];
        assert_eq!(src.building_ids, vec!["h1", "h2"]);
        assert_eq!(src.parent_district_id.as_deref(), Some("1"));
        assert_eq!(src.fqn, "myrepo.src");

        let city = landscape.cities.values().next().unwrap();
        assert_eq!(city.root_district_ids, vec!["1"]);
        assert_eq!(city.district_ids, vec!["1", "2"]);
    }

    #[test]
    fn test_file_without_directory_goes_to_root_district() {
        let c = commit("c1", vec![file(10, "orphan.txt", "h1", None)], vec![]);
        let mut landscape = FlatLandscape::new("tok");
        project_commit(&mut landscape, "myrepo", &c);

        let city_id = stable_id("myrepo");
        let root_id = format!("{}-root", city_id);
        let root = &landscape.districts[&root_id];
        assert_eq!(root.name, "root");
        assert_eq!(root.building_ids, vec!["h1"]);
        assert_eq!(landscape.cities[&city_id].root_district_ids, vec![root_id]);
    }

    #[test]
    fn test_building_fqn_uses_package() {
        let mut f = file(10, "App.java", "h1", Some(1));
        f.file.package_name = Some("net.example".to_string());
        let c = commit("c1", vec![f], vec![dir(1, "myrepo", None)]);

        let mut landscape = FlatLandscape::new("tok");
        project_commit(&mut landscape, "myrepo", &c);
        assert_eq!(landscape.buildings["h1"].fqn, "net.example.App.java");
    }

    #[test]
    fn test_classes_and_functions_are_linked() {
        let mut f = file(10, "App.java", "h1", Some(1));
        let mut run = FunctionNode::new(NodeId(30), "run");
        run.metrics.insert("loc".to_string(), 12.0);
        f.classes.push(HydratedClass {
            class: ClazzNode::new(NodeId(20), "net.example.App"),
            functions: vec![run],
        });
        f.functions.push(FunctionNode::new(NodeId(31), "main"));
        let c = commit("c1", vec![f], vec![dir(1, "myrepo", None)]);

        let mut landscape = FlatLandscape::new("tok");
        project_commit(&mut landscape, "myrepo", &c);

        let class_id = stable_id("net.example.App");
        let class = &landscape.classes[&class_id];
        assert_eq!(class.name, "App");
        assert_eq!(class.parent_building_id, "h1");

        let method_id = stable_id("net.example.App::run");
        assert_eq!(class.function_ids, vec![method_id.clone()]);
        assert_eq!(landscape.functions[&method_id].parent_id, class_id);
        assert_eq!(landscape.functions[&method_id].metrics["loc"], 12.0);

        let top_id = stable_id("App.java::main");
        let building = &landscape.buildings["h1"];
        assert_eq!(building.class_ids, vec![class_id]);
        assert_eq!(building.function_ids, vec![top_id.clone()]);
        assert_eq!(landscape.functions[&top_id].parent_id, "h1");
    }

    #[test]
    fn test_reprojection_is_idempotent() {
        let c = commit(
            "c1",
            vec![file(10, "A.java", "h1", Some(2))],
            vec![dir(1, "myrepo", None), dir(2, "src", Some(1))],
        );
        let mut once = FlatLandscape::new("tok");
        project_commit(&mut once, "myrepo", &c);
        let mut twice = once.clone();
        project_commit(&mut twice, "myrepo", &c);

        assert_eq!(once, twice);
    }
}
