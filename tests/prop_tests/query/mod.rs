mod prop_pagination;
