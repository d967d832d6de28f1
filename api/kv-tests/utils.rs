#![allow(dead_code)]

//Some general testing utilities
use std::fs::{create_dir_all, remove_dir, remove_file};
use std::path::{Path, PathBuf};

//Create the folders 'name' leading up to 'db_name', starting from the crate root
//Additionally, remove 'db_name' if it already exists in the file system, to make sure we can start from a fresh database
//To avoid parallel tests from overlapping, each test passes in its own unique `name`, so it gets access to its own resources
pub fn db_prep_path(name: &str, db_name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push(name);
    path.push(db_name);

    if path.exists() {
        //Remove the file in case it already exists
        remove_file(&path).unwrap();
    }
    {
        //Create any missing directories first, if applicable
        let prefix = path.parent().unwrap();
        create_dir_all(prefix).unwrap();
    }

    path
}

//Undo folder creation, including removing the parent
pub fn db_unprep_path(path: &Path) {
    //Ensure that the file has been deleted before going on
    remove_file(path).unwrap();

    let parent = path.parent().unwrap();
    remove_dir(parent).unwrap(); //Safety; only remove if empty
}
